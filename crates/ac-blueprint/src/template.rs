use ac_core::AssessmentError;
use ac_core::Unique;
use ac_core::ID;
use ac_items::Competency;
use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeSet;

/// A reusable, versioned test definition (spec §3 `TestTemplate`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestTemplate {
    id: ID<TestTemplate>,
    name: String,
    version: u32,
    parent_version: Option<u32>,
    owner_clerk_id: String,
    visibility: Visibility,
    lifecycle: Lifecycle,
    blueprint: Blueprint,
    competency_ids: BTreeSet<ID<Competency>>,
    questions_per_indicator: u32,
    time_limit_seconds: u32,
    passing_score: f64,
    shuffle_questions: bool,
    shuffle_options: bool,
    allow_skip: bool,
    allow_back_navigation: bool,
    deleted_at: Option<DateTime<Utc>>,
}

impl TestTemplate {
    pub fn new(
        id: ID<TestTemplate>,
        name: String,
        owner_clerk_id: String,
        visibility: Visibility,
        blueprint: Blueprint,
        competency_ids: BTreeSet<ID<Competency>>,
        questions_per_indicator: u32,
        time_limit_seconds: u32,
        passing_score: f64,
    ) -> Self {
        Self {
            id,
            name,
            version: 1,
            parent_version: None,
            owner_clerk_id,
            visibility,
            lifecycle: Lifecycle::Draft,
            blueprint,
            competency_ids,
            questions_per_indicator,
            time_limit_seconds,
            passing_score,
            shuffle_questions: true,
            shuffle_options: true,
            allow_skip: true,
            allow_back_navigation: true,
            deleted_at: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn version(&self) -> u32 {
        self.version
    }
    pub fn parent_version(&self) -> Option<u32> {
        self.parent_version
    }
    pub fn owner_clerk_id(&self) -> &str {
        &self.owner_clerk_id
    }
    pub fn visibility(&self) -> Visibility {
        self.visibility
    }
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }
    pub fn goal(&self) -> Goal {
        self.blueprint.goal()
    }
    pub fn blueprint(&self) -> &Blueprint {
        &self.blueprint
    }
    pub fn competency_ids(&self) -> &BTreeSet<ID<Competency>> {
        &self.competency_ids
    }
    pub fn questions_per_indicator(&self) -> u32 {
        self.questions_per_indicator
    }
    pub fn time_limit_seconds(&self) -> u32 {
        self.time_limit_seconds
    }
    pub fn passing_score(&self) -> f64 {
        self.passing_score
    }
    pub fn shuffle_questions(&self) -> bool {
        self.shuffle_questions
    }
    pub fn shuffle_options(&self) -> bool {
        self.shuffle_options
    }
    pub fn allow_skip(&self) -> bool {
        self.allow_skip
    }
    pub fn allow_back_navigation(&self) -> bool {
        self.allow_back_navigation
    }
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    pub fn with_navigation_flags(mut self, allow_skip: bool, allow_back_navigation: bool) -> Self {
        self.allow_skip = allow_skip;
        self.allow_back_navigation = allow_back_navigation;
        self
    }
    pub fn with_shuffle_flags(mut self, shuffle_questions: bool, shuffle_options: bool) -> Self {
        self.shuffle_questions = shuffle_questions;
        self.shuffle_options = shuffle_options;
        self
    }

    /// Spec §3 invariant: a published template is immutable. Drafts may be
    /// published directly; publishing an already-published or archived
    /// template is an `InvalidState` error rather than a silent no-op, since
    /// the caller almost certainly meant to create a new version instead.
    pub fn publish(&mut self) -> Result<(), AssessmentError> {
        match self.lifecycle {
            Lifecycle::Draft => {
                self.lifecycle = Lifecycle::Published;
                Ok(())
            }
            Lifecycle::Published | Lifecycle::Archived => Err(AssessmentError::invalid_state(
                "only a draft template may be published",
            )),
        }
    }

    pub fn archive(&mut self) {
        self.lifecycle = Lifecycle::Archived;
    }

    /// Rehydrates lineage/lifecycle state read back from the repository.
    /// `TestTemplate::new` always starts a fresh draft at version 1; this
    /// overwrites those defaults with the persisted row's actual values.
    pub(crate) fn restore_lineage(
        &mut self,
        version: u32,
        parent_version: Option<u32>,
        lifecycle: Lifecycle,
        deleted_at: Option<DateTime<Utc>>,
    ) {
        self.version = version;
        self.parent_version = parent_version;
        self.lifecycle = lifecycle;
        self.deleted_at = deleted_at;
    }

    pub fn soft_delete(&mut self, now: DateTime<Utc>) {
        self.deleted_at = Some(now);
    }

    /// Spec §3 invariant: edits to a published template produce a new
    /// version whose `parent` points to the predecessor, rather than
    /// mutating the published row. `id` identifies the lineage and stays
    /// constant across versions (the repository's primary key is
    /// `(id, version)`); sessions record the exact `version` they started
    /// against, so the predecessor row remains addressable and immutable.
    pub fn new_version(&self) -> TestTemplate {
        TestTemplate {
            version: self.version + 1,
            parent_version: Some(self.version),
            lifecycle: Lifecycle::Draft,
            deleted_at: None,
            ..self.clone()
        }
    }
}

impl Unique for TestTemplate {
    fn id(&self) -> ID<Self> {
        self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    Public,
    Private,
    Link,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "Public",
            Self::Private => "Private",
            Self::Link => "Link",
        }
    }
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "Public" => Self::Public,
            "Private" => Self::Private,
            "Link" => Self::Link,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Lifecycle {
    Draft,
    Published,
    Archived,
}

impl Lifecycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "Draft",
            Self::Published => "Published",
            Self::Archived => "Archived",
        }
    }
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "Draft" => Self::Draft,
            "Published" => Self::Published,
            "Archived" => Self::Archived,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Goal {
    Overview,
    JobFit,
    TeamFit,
}

impl Goal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Overview => "Overview",
            Self::JobFit => "JobFit",
            Self::TeamFit => "TeamFit",
        }
    }
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "Overview" => Self::Overview,
            "JobFit" => Self::JobFit,
            "TeamFit" => Self::TeamFit,
            _ => return None,
        })
    }
}

/// Goal-tagged configuration (spec §3 "typed blueprint"); the template's
/// `goal` is always derivable from which variant is present, so it is never
/// stored separately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Blueprint {
    Overview {
        include_big_five: bool,
    },
    JobFit {
        onet_occupation_code: String,
        delta_testing_enabled: bool,
        delta_skip_threshold: f64,
        strictness_level: u8,
        passport_max_age_days: i64,
    },
    TeamFit {
        team_id: String,
    },
}

impl Blueprint {
    pub fn goal(&self) -> Goal {
        match self {
            Self::Overview { .. } => Goal::Overview,
            Self::JobFit { .. } => Goal::JobFit,
            Self::TeamFit { .. } => Goal::TeamFit,
        }
    }
}

mod pg_schema {
    use super::*;
    use ac_pg::Schema;
    use ac_pg::TEMPLATES;

    impl Schema for TestTemplate {
        fn name() -> &'static str {
            TEMPLATES
        }
        fn creates() -> &'static str {
            const_format::concatcp!(
                "CREATE TABLE IF NOT EXISTS ",
                TEMPLATES,
                " (
                    id                       UUID NOT NULL,
                    version                  INTEGER NOT NULL,
                    parent_version           INTEGER,
                    name                     VARCHAR(256) NOT NULL,
                    owner_clerk_id           VARCHAR(128) NOT NULL,
                    visibility               VARCHAR(16) NOT NULL,
                    lifecycle                VARCHAR(16) NOT NULL,
                    goal                     VARCHAR(16) NOT NULL,
                    blueprint                JSONB NOT NULL,
                    competency_ids           JSONB NOT NULL DEFAULT '[]',
                    questions_per_indicator  INTEGER NOT NULL,
                    time_limit_seconds       INTEGER NOT NULL,
                    passing_score            DOUBLE PRECISION NOT NULL,
                    shuffle_questions        BOOLEAN NOT NULL DEFAULT TRUE,
                    shuffle_options          BOOLEAN NOT NULL DEFAULT TRUE,
                    allow_skip               BOOLEAN NOT NULL DEFAULT TRUE,
                    allow_back_navigation    BOOLEAN NOT NULL DEFAULT TRUE,
                    deleted_at               TIMESTAMPTZ,
                    PRIMARY KEY (id, version)
                );"
            )
        }
        fn indices() -> &'static str {
            const_format::concatcp!(
                "CREATE INDEX IF NOT EXISTS idx_templates_lifecycle ON ",
                TEMPLATES,
                " (lifecycle);
                 CREATE INDEX IF NOT EXISTS idx_templates_owner ON ",
                TEMPLATES,
                " (owner_clerk_id);"
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> TestTemplate {
        TestTemplate::new(
            ID::default(),
            "Engineering Overview".into(),
            "clerk_owner".into(),
            Visibility::Private,
            Blueprint::Overview {
                include_big_five: true,
            },
            BTreeSet::new(),
            3,
            1800,
            70.0,
        )
    }

    #[test]
    fn fresh_template_starts_as_draft_version_one() {
        let t = template();
        assert_eq!(t.lifecycle(), Lifecycle::Draft);
        assert_eq!(t.version(), 1);
        assert_eq!(t.parent_version(), None);
    }

    #[test]
    fn publishing_twice_is_rejected() {
        let mut t = template();
        t.publish().unwrap();
        assert_eq!(t.lifecycle(), Lifecycle::Published);
        assert!(t.publish().is_err());
    }

    #[test]
    fn new_version_points_back_to_parent_and_resets_lifecycle() {
        let mut t = template();
        t.publish().unwrap();
        let child = t.new_version();
        assert_eq!(child.id(), t.id());
        assert_eq!(child.version(), 2);
        assert_eq!(child.parent_version(), Some(1));
        assert_eq!(child.lifecycle(), Lifecycle::Draft);
    }

    #[test]
    fn goal_is_derived_from_blueprint_variant() {
        let t = template();
        assert_eq!(t.goal(), Goal::Overview);
    }
}
