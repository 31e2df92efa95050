use crate::Blueprint;
use crate::Lifecycle;
use crate::TestTemplate;
use crate::Visibility;
use ac_core::AssessmentError;
use ac_core::Unique;
use ac_core::ID;
use ac_items::Competency;
use ac_pg::TEMPLATES;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;
use tokio_postgres::Client;
use tokio_postgres::Row;

#[async_trait]
pub trait TemplateRepository: Send + Sync {
    /// The highest `version` row for the lineage identified by `id`.
    async fn get_latest(&self, id: ID<TestTemplate>) -> Result<Option<TestTemplate>, AssessmentError>;
    async fn get_version(
        &self,
        id: ID<TestTemplate>,
        version: u32,
    ) -> Result<Option<TestTemplate>, AssessmentError>;
    async fn upsert(&self, template: &TestTemplate) -> Result<(), AssessmentError>;
}

#[derive(Default)]
pub struct InMemoryTemplateRepository {
    versions: RwLock<HashMap<(uuid::Uuid, u32), TestTemplate>>,
}

impl InMemoryTemplateRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TemplateRepository for InMemoryTemplateRepository {
    async fn get_latest(&self, id: ID<TestTemplate>) -> Result<Option<TestTemplate>, AssessmentError> {
        let versions = self.versions.read().unwrap();
        Ok(versions
            .values()
            .filter(|t| t.id() == id)
            .max_by_key(|t| t.version())
            .cloned())
    }
    async fn get_version(
        &self,
        id: ID<TestTemplate>,
        version: u32,
    ) -> Result<Option<TestTemplate>, AssessmentError> {
        Ok(self.versions.read().unwrap().get(&(id.inner(), version)).cloned())
    }
    async fn upsert(&self, template: &TestTemplate) -> Result<(), AssessmentError> {
        self.versions
            .write()
            .unwrap()
            .insert((template.id().inner(), template.version()), template.clone());
        Ok(())
    }
}

fn row_to_template(row: &Row) -> Result<TestTemplate, AssessmentError> {
    let id: ID<TestTemplate> = ID::from(row.get::<_, uuid::Uuid>(0));
    let version: i32 = row.get(1);
    let parent_version: Option<i32> = row.get(2);
    let name: String = row.get(3);
    let owner_clerk_id: String = row.get(4);
    let visibility_raw: String = row.get(5);
    let lifecycle_raw: String = row.get(6);
    let blueprint_raw: serde_json::Value = row.get(8);
    let competency_ids_raw: serde_json::Value = row.get(9);
    let questions_per_indicator: i32 = row.get(10);
    let time_limit_seconds: i32 = row.get(11);
    let passing_score: f64 = row.get(12);
    let shuffle_questions: bool = row.get(13);
    let shuffle_options: bool = row.get(14);
    let allow_skip: bool = row.get(15);
    let allow_back_navigation: bool = row.get(16);
    let deleted_at: Option<chrono::DateTime<chrono::Utc>> = row.get(17);

    let visibility = Visibility::parse(&visibility_raw)
        .ok_or_else(|| AssessmentError::internal(format!("corrupt visibility: {visibility_raw}")))?;
    let lifecycle = Lifecycle::parse(&lifecycle_raw)
        .ok_or_else(|| AssessmentError::internal(format!("corrupt lifecycle: {lifecycle_raw}")))?;
    let blueprint: Blueprint =
        serde_json::from_value(blueprint_raw).map_err(|e| AssessmentError::internal(e.to_string()))?;
    let competency_id_strings: Vec<String> =
        serde_json::from_value(competency_ids_raw).map_err(|e| AssessmentError::internal(e.to_string()))?;
    let competency_ids: BTreeSet<ID<Competency>> = competency_id_strings
        .into_iter()
        .map(|s| {
            uuid::Uuid::parse_str(&s)
                .map(ID::from)
                .map_err(|e| AssessmentError::internal(format!("corrupt competency id: {e}")))
        })
        .collect::<Result<_, _>>()?;

    let mut template = TestTemplate::new(
        id,
        name,
        owner_clerk_id,
        visibility,
        blueprint,
        competency_ids,
        questions_per_indicator as u32,
        time_limit_seconds as u32,
        passing_score,
    )
    .with_shuffle_flags(shuffle_questions, shuffle_options)
    .with_navigation_flags(allow_skip, allow_back_navigation);
    template.restore_lineage(version as u32, parent_version.map(|v| v as u32), lifecycle, deleted_at);
    Ok(template)
}

#[async_trait]
impl TemplateRepository for Arc<Client> {
    async fn get_latest(&self, id: ID<TestTemplate>) -> Result<Option<TestTemplate>, AssessmentError> {
        let row = self
            .query_opt(
                const_format::concatcp!(
                    "SELECT id, version, parent_version, name, owner_clerk_id, visibility, lifecycle,
                            goal, blueprint, competency_ids, questions_per_indicator, time_limit_seconds,
                            passing_score, shuffle_questions, shuffle_options, allow_skip,
                            allow_back_navigation, deleted_at FROM ",
                    TEMPLATES,
                    " WHERE id = $1 ORDER BY version DESC LIMIT 1"
                ),
                &[&id.inner()],
            )
            .await?;
        row.as_ref().map(row_to_template).transpose()
    }

    async fn get_version(
        &self,
        id: ID<TestTemplate>,
        version: u32,
    ) -> Result<Option<TestTemplate>, AssessmentError> {
        let row = self
            .query_opt(
                const_format::concatcp!(
                    "SELECT id, version, parent_version, name, owner_clerk_id, visibility, lifecycle,
                            goal, blueprint, competency_ids, questions_per_indicator, time_limit_seconds,
                            passing_score, shuffle_questions, shuffle_options, allow_skip,
                            allow_back_navigation, deleted_at FROM ",
                    TEMPLATES,
                    " WHERE id = $1 AND version = $2"
                ),
                &[&id.inner(), &(version as i32)],
            )
            .await?;
        row.as_ref().map(row_to_template).transpose()
    }

    async fn upsert(&self, template: &TestTemplate) -> Result<(), AssessmentError> {
        let blueprint_json = serde_json::to_value(template.blueprint()).unwrap_or_default();
        let competency_ids: Vec<String> = template
            .competency_ids()
            .iter()
            .map(|id| id.inner().to_string())
            .collect();
        let competency_ids_json = serde_json::to_value(competency_ids).unwrap_or_default();

        self.execute(
            const_format::concatcp!(
                "INSERT INTO ",
                TEMPLATES,
                " (id, version, parent_version, name, owner_clerk_id, visibility, lifecycle, goal,
                   blueprint, competency_ids, questions_per_indicator, time_limit_seconds, passing_score,
                   shuffle_questions, shuffle_options, allow_skip, allow_back_navigation, deleted_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
                 ON CONFLICT (id, version) DO UPDATE SET
                   lifecycle = EXCLUDED.lifecycle,
                   deleted_at = EXCLUDED.deleted_at"
            ),
            &[
                &template.id().inner(),
                &(template.version() as i32),
                &template.parent_version().map(|v| v as i32),
                &template.name(),
                &template.owner_clerk_id(),
                &template.visibility().as_str(),
                &template.lifecycle().as_str(),
                &template.goal().as_str(),
                &blueprint_json,
                &competency_ids_json,
                &(template.questions_per_indicator() as i32),
                &(template.time_limit_seconds() as i32),
                &template.passing_score(),
                &template.shuffle_questions(),
                &template.shuffle_options(),
                &template.allow_skip(),
                &template.allow_back_navigation(),
                &template.deleted_at(),
            ],
        )
        .await?;
        Ok(())
    }
}
