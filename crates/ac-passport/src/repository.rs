use crate::CompetencyPassport;
use ac_core::AssessmentError;
use ac_core::ID;
use ac_items::BigFiveTrait;
use ac_items::Competency;
use ac_pg::PASSPORTS;
use ac_pg::Schema;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;
use tokio_postgres::Client;

#[async_trait]
pub trait PassportRepository: Send + Sync {
    async fn get_passport(&self, user_id: &str) -> Result<Option<CompetencyPassport>, AssessmentError>;
    async fn upsert_passport(&self, passport: &CompetencyPassport) -> Result<(), AssessmentError>;
}

#[derive(Default)]
pub struct InMemoryPassportRepository {
    passports: RwLock<HashMap<String, CompetencyPassport>>,
}

impl InMemoryPassportRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PassportRepository for InMemoryPassportRepository {
    async fn get_passport(&self, user_id: &str) -> Result<Option<CompetencyPassport>, AssessmentError> {
        Ok(self.passports.read().unwrap().get(user_id).cloned())
    }
    async fn upsert_passport(&self, passport: &CompetencyPassport) -> Result<(), AssessmentError> {
        self.passports
            .write()
            .unwrap()
            .insert(passport.user_id().to_string(), passport.clone());
        Ok(())
    }
}

impl Schema for CompetencyPassport {
    fn name() -> &'static str {
        PASSPORTS
    }
    fn creates() -> &'static str {
        const_format::concatcp!(
            "CREATE TABLE IF NOT EXISTS ",
            PASSPORTS,
            " (
                user_id          VARCHAR(128) PRIMARY KEY,
                scores           JSONB NOT NULL DEFAULT '{}',
                big_five_profile JSONB,
                last_assessed    TIMESTAMPTZ NOT NULL,
                expires_at       TIMESTAMPTZ NOT NULL,
                source_result_id UUID
            );"
        )
    }
    fn indices() -> &'static str {
        const_format::concatcp!(
            "CREATE INDEX IF NOT EXISTS idx_passports_expiry ON ",
            PASSPORTS,
            " (expires_at);"
        )
    }
}

#[async_trait]
impl PassportRepository for Arc<Client> {
    async fn get_passport(&self, user_id: &str) -> Result<Option<CompetencyPassport>, AssessmentError> {
        let row = self
            .query_opt(
                const_format::concatcp!(
                    "SELECT user_id, scores, big_five_profile, last_assessed, expires_at, source_result_id FROM ",
                    PASSPORTS,
                    " WHERE user_id = $1"
                ),
                &[&user_id],
            )
            .await?;
        let Some(row) = row else { return Ok(None) };

        let scores_raw: serde_json::Value = row.get(1);
        let scores_map: BTreeMap<String, f64> =
            serde_json::from_value(scores_raw).map_err(|e| AssessmentError::internal(e.to_string()))?;
        let mut scores = BTreeMap::new();
        for (k, v) in scores_map {
            let uuid = uuid::Uuid::parse_str(&k)
                .map_err(|e| AssessmentError::internal(format!("corrupt competency id: {e}")))?;
            scores.insert(ID::from(uuid), v);
        }

        let big_five_raw: Option<serde_json::Value> = row.get(2);
        let big_five_profile = big_five_raw
            .map(|raw| -> Result<BTreeMap<BigFiveTrait, f64>, AssessmentError> {
                let map: BTreeMap<String, f64> =
                    serde_json::from_value(raw).map_err(|e| AssessmentError::internal(e.to_string()))?;
                map.into_iter()
                    .map(|(k, v)| {
                        BigFiveTrait::parse(&k)
                            .ok_or_else(|| AssessmentError::internal(format!("unrecognized trait {k}")))
                            .map(|t| (t, v))
                    })
                    .collect()
            })
            .transpose()?;

        Ok(Some(CompetencyPassport {
            user_id: row.get(0),
            scores,
            big_five_profile,
            last_assessed: row.get(3),
            expires_at: row.get(4),
            source_result_id: row.get(5),
        }))
    }

    async fn upsert_passport(&self, passport: &CompetencyPassport) -> Result<(), AssessmentError> {
        let scores: BTreeMap<String, f64> = passport
            .scores
            .iter()
            .map(|(k, v)| (k.inner().to_string(), *v))
            .collect();
        let scores_json = serde_json::to_value(scores).unwrap_or_default();
        let big_five_json = passport.big_five_profile.as_ref().map(|profile| {
            let map: BTreeMap<String, f64> =
                profile.iter().map(|(t, v)| (t.as_str().to_string(), *v)).collect();
            serde_json::to_value(map).unwrap_or_default()
        });

        self.execute(
            const_format::concatcp!(
                "INSERT INTO ",
                PASSPORTS,
                " (user_id, scores, big_five_profile, last_assessed, expires_at, source_result_id)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 ON CONFLICT (user_id) DO UPDATE SET
                   scores = EXCLUDED.scores,
                   big_five_profile = EXCLUDED.big_five_profile,
                   last_assessed = EXCLUDED.last_assessed,
                   expires_at = EXCLUDED.expires_at,
                   source_result_id = EXCLUDED.source_result_id"
            ),
            &[
                &passport.user_id,
                &scores_json,
                &big_five_json,
                &passport.last_assessed,
                &passport.expires_at,
                &passport.source_result_id,
            ],
        )
        .await?;
        Ok(())
    }
}
