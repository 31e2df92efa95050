/// Schema metadata for PostgreSQL tables.
///
/// Purely descriptive — no I/O. Grounded on the teacher's `rbp_pg::Schema`
/// trait, trimmed to the two statements this domain actually needs
/// (`creates`/`indices`); the teacher's bulk `COPY`/freeze machinery was for
/// write-once training artifacts and has no counterpart here, where rows are
/// mutated throughout a session's lifetime.
pub trait Schema {
    /// Table name.
    fn name() -> &'static str;
    /// `CREATE TABLE IF NOT EXISTS` DDL.
    fn creates() -> &'static str;
    /// `CREATE INDEX IF NOT EXISTS` statements.
    fn indices() -> &'static str;
}
