use super::ItemRepository;
use crate::AnswerOption;
use crate::AssessmentQuestion;
use crate::BehavioralIndicator;
use crate::BigFiveReliability;
use crate::BigFiveTrait;
use crate::Competency;
use crate::CompetencyReliability;
use crate::ContextScope;
use crate::DifficultyBand;
use crate::DifficultyFlag;
use crate::DiscriminationFlag;
use crate::IrtFit;
use crate::ItemStatistics;
use crate::QuestionType;
use crate::ReliabilityStatus;
use crate::ScoringRubric;
use crate::StatusChange;
use crate::ValidityStatus;
use ac_core::AssessmentError;
use ac_core::ID;
use ac_pg::BIG_FIVE_RELIABILITY;
use ac_pg::COMPETENCIES;
use ac_pg::COMPETENCY_RELIABILITY;
use ac_pg::INDICATORS;
use ac_pg::ITEMS;
use ac_pg::ITEM_STATISTICS;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_postgres::Client;
use tokio_postgres::Row;

/// Decodes a VARCHAR-encoded enum column, surfacing a corrupt row as an
/// internal error rather than panicking (spec §7: no `unwrap` on data read
/// back from storage we do not fully control at compile time).
fn decode<T>(column: &str, raw: &str, parse: impl Fn(&str) -> Option<T>) -> Result<T, AssessmentError> {
    parse(raw).ok_or_else(|| {
        AssessmentError::internal(format!("unrecognized {} value in storage: {}", column, raw))
    })
}

fn row_to_competency(row: &Row) -> Result<Competency, AssessmentError> {
    let big_five: Option<String> = row.get(3);
    let big_five_trait = big_five
        .map(|s| decode("big_five_trait", &s, BigFiveTrait::parse))
        .transpose()?;
    let mut competency = Competency::new(
        ID::from(row.get::<_, uuid::Uuid>(0)),
        row.get::<_, String>(1),
        big_five_trait,
    );
    if !row.get::<_, bool>(2) {
        competency.archive();
    }
    Ok(competency)
}

fn row_to_indicator(row: &Row) -> Result<BehavioralIndicator, AssessmentError> {
    let scope: String = row.get(3);
    Ok(BehavioralIndicator::new(
        ID::from(row.get::<_, uuid::Uuid>(0)),
        ID::from(row.get::<_, uuid::Uuid>(1)),
        row.get::<_, String>(2),
        decode("context_scope", &scope, ContextScope::parse)?,
    ))
}

fn row_to_item(row: &Row) -> Result<AssessmentQuestion, AssessmentError> {
    let kind: String = row.get(3);
    let options: serde_json::Value = row.get(4);
    let rubric: serde_json::Value = row.get(5);
    let band: String = row.get(6);
    let metadata: serde_json::Value = row.get(8);

    let kind = decode("kind", &kind, QuestionType::parse)?;
    let options: Vec<AnswerOption> =
        serde_json::from_value(options).map_err(|e| AssessmentError::internal(e.to_string()))?;
    let rubric = decode_rubric(kind, rubric)?;
    let band = decode("difficulty_band", &band, DifficultyBand::parse)?;
    let metadata: BTreeMap<String, serde_json::Value> =
        serde_json::from_value(metadata).map_err(|e| AssessmentError::internal(e.to_string()))?;

    let mut item = AssessmentQuestion::new(
        ID::from(row.get::<_, uuid::Uuid>(0)),
        ID::from(row.get::<_, uuid::Uuid>(1)),
        row.get::<_, String>(2),
        kind,
        options,
        rubric,
        band,
        row.get::<_, i32>(7) as u32,
    )?
    .with_metadata(metadata);
    let active: bool = row.get(9);
    let exposure: i64 = row.get(10);
    for _ in 0..exposure {
        item.bump_exposure();
    }
    if !active {
        item.deactivate();
    }
    Ok(item)
}

fn decode_rubric(kind: QuestionType, raw: serde_json::Value) -> Result<ScoringRubric, AssessmentError> {
    let rubric = match kind {
        QuestionType::Likert => ScoringRubric::Likert,
        QuestionType::MultipleChoice | QuestionType::SituationalJudgment => {
            let scores: BTreeMap<String, f64> =
                serde_json::from_value(raw).map_err(|e| AssessmentError::internal(e.to_string()))?;
            ScoringRubric::OptionScores(scores)
        }
        QuestionType::Ranking => {
            let key: Vec<String> =
                serde_json::from_value(raw).map_err(|e| AssessmentError::internal(e.to_string()))?;
            ScoringRubric::RankingKey(key)
        }
        QuestionType::FreeText => ScoringRubric::None,
    };
    Ok(rubric)
}

fn row_to_statistics(row: &Row) -> Result<ItemStatistics, AssessmentError> {
    let irt_a: Option<f64> = row.get(4);
    let irt_b: Option<f64> = row.get(5);
    let irt_c: Option<f64> = row.get(6);
    let irt = irt_a.zip(irt_b).map(|(a, b)| IrtFit { a, b, c: irt_c });
    let validity: String = row.get(8);
    let difficulty_flag: String = row.get(9);
    let discrimination_flag: String = row.get(10);
    let history_raw: serde_json::Value = row.get(11);
    let history: Vec<StatusChange> =
        serde_json::from_value(history_raw).map_err(|e| AssessmentError::internal(e.to_string()))?;

    let mut stats = ItemStatistics::new(ID::from(row.get::<_, uuid::Uuid>(0)));
    stats.record_metrics(row.get::<_, f64>(1), row.get::<_, f64>(2), irt, row.get::<_, i32>(7) as u32)?;
    stats.restore(
        decode("validity_status", &validity, ValidityStatus::parse)?,
        decode("difficulty_flag", &difficulty_flag, DifficultyFlag::parse)?,
        decode("discrimination_flag", &discrimination_flag, DiscriminationFlag::parse)?,
        row.get::<_, Option<f64>>(3),
        history,
    );
    Ok(stats)
}

#[async_trait]
impl ItemRepository for Arc<Client> {
    async fn get_competency(&self, id: ID<Competency>) -> Result<Option<Competency>, AssessmentError> {
        let row = self
            .query_opt(
                const_format::concatcp!(
                    "SELECT id, name, active, big_five_trait FROM ",
                    COMPETENCIES,
                    " WHERE id = $1"
                ),
                &[&id.inner()],
            )
            .await?;
        row.as_ref().map(row_to_competency).transpose()
    }

    async fn list_active_competencies(&self) -> Result<Vec<Competency>, AssessmentError> {
        let rows = self
            .query(
                const_format::concatcp!(
                    "SELECT id, name, active, big_five_trait FROM ",
                    COMPETENCIES,
                    " WHERE active = TRUE"
                ),
                &[],
            )
            .await?;
        rows.iter().map(row_to_competency).collect()
    }

    async fn get_indicator(
        &self,
        id: ID<BehavioralIndicator>,
    ) -> Result<Option<BehavioralIndicator>, AssessmentError> {
        let row = self
            .query_opt(
                const_format::concatcp!(
                    "SELECT id, competency_id, name, context_scope FROM ",
                    INDICATORS,
                    " WHERE id = $1"
                ),
                &[&id.inner()],
            )
            .await?;
        row.as_ref().map(row_to_indicator).transpose()
    }

    async fn list_indicators(
        &self,
        competency_id: ID<Competency>,
    ) -> Result<Vec<BehavioralIndicator>, AssessmentError> {
        let rows = self
            .query(
                const_format::concatcp!(
                    "SELECT id, competency_id, name, context_scope FROM ",
                    INDICATORS,
                    " WHERE competency_id = $1"
                ),
                &[&competency_id.inner()],
            )
            .await?;
        rows.iter().map(row_to_indicator).collect()
    }

    async fn sibling_indicators(
        &self,
        competency_id: ID<Competency>,
        excluding: ID<BehavioralIndicator>,
    ) -> Result<Vec<BehavioralIndicator>, AssessmentError> {
        let rows = self
            .query(
                const_format::concatcp!(
                    "SELECT id, competency_id, name, context_scope FROM ",
                    INDICATORS,
                    " WHERE competency_id = $1 AND id != $2"
                ),
                &[&competency_id.inner(), &excluding.inner()],
            )
            .await?;
        rows.iter().map(row_to_indicator).collect()
    }

    async fn candidates(
        &self,
        indicator_id: ID<BehavioralIndicator>,
        band: DifficultyBand,
    ) -> Result<Vec<AssessmentQuestion>, AssessmentError> {
        let rows = self
            .query(
                const_format::concatcp!(
                    "SELECT id, indicator_id, text, kind, options, rubric, difficulty_band,
                     time_limit_seconds, metadata, active, exposure_count FROM ",
                    ITEMS,
                    " WHERE indicator_id = $1 AND difficulty_band = $2 AND active = TRUE"
                ),
                &[&indicator_id.inner(), &band.as_str()],
            )
            .await?;
        rows.iter().map(row_to_item).collect()
    }

    async fn get_items(
        &self,
        ids: &[ID<AssessmentQuestion>],
    ) -> Result<Vec<AssessmentQuestion>, AssessmentError> {
        let ids: Vec<uuid::Uuid> = ids.iter().map(|id| id.inner()).collect();
        let rows = self
            .query(
                const_format::concatcp!(
                    "SELECT id, indicator_id, text, kind, options, rubric, difficulty_band,
                     time_limit_seconds, metadata, active, exposure_count FROM ",
                    ITEMS,
                    " WHERE id = ANY($1)"
                ),
                &[&ids],
            )
            .await?;
        rows.iter().map(row_to_item).collect()
    }

    async fn get_item(
        &self,
        id: ID<AssessmentQuestion>,
    ) -> Result<Option<AssessmentQuestion>, AssessmentError> {
        let row = self
            .query_opt(
                const_format::concatcp!(
                    "SELECT id, indicator_id, text, kind, options, rubric, difficulty_band,
                     time_limit_seconds, metadata, active, exposure_count FROM ",
                    ITEMS,
                    " WHERE id = $1"
                ),
                &[&id.inner()],
            )
            .await?;
        row.as_ref().map(row_to_item).transpose()
    }

    async fn increment_exposure(&self, id: ID<AssessmentQuestion>) -> Result<(), AssessmentError> {
        let client = self.clone();
        ac_core::retry::with_default_backoff(|| {
            let client = client.clone();
            async move {
                let updated = client
                    .execute(
                        const_format::concatcp!(
                            "UPDATE ",
                            ITEMS,
                            " SET exposure_count = exposure_count + 1 WHERE id = $1"
                        ),
                        &[&id.inner()],
                    )
                    .await?;
                if updated == 0 {
                    return Err(AssessmentError::not_found("AssessmentQuestion", id));
                }
                Ok(())
            }
        })
        .await
    }

    async fn get_statistics(
        &self,
        item_id: ID<AssessmentQuestion>,
    ) -> Result<Option<ItemStatistics>, AssessmentError> {
        let row = self
            .query_opt(
                const_format::concatcp!(
                    "SELECT item_id, p_value, discrimination, previous_discrimination,
                     irt_a, irt_b, irt_c, response_count, validity_status, difficulty_flag,
                     discrimination_flag, status_change_history FROM ",
                    ITEM_STATISTICS,
                    " WHERE item_id = $1"
                ),
                &[&item_id.inner()],
            )
            .await?;
        let Some(row) = row else { return Ok(None) };
        row_to_statistics(&row).map(Some)
    }

    /// The ordered, append-only `status_change_history` (spec §3/§6) is a
    /// JSONB column rather than a child table, matching §6's "JSONB columns
    /// for blueprints, rubrics, option lists, status-change history,
    /// competency-score breakdowns"; it is rewritten whole on every upsert
    /// since `ItemStatistics` is written exclusively by the psychometric
    /// job under its named lock (spec §5), so there is no concurrent
    /// appender to race against.
    async fn upsert_statistics(&self, stats: &ItemStatistics) -> Result<(), AssessmentError> {
        let history_json = serde_json::to_value(stats.history()).unwrap_or_default();
        self.execute(
            const_format::concatcp!(
                "INSERT INTO ",
                ITEM_STATISTICS,
                " (item_id, p_value, discrimination, previous_discrimination, irt_a, irt_b, irt_c,
                   response_count, validity_status, difficulty_flag, discrimination_flag,
                   status_change_history)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                 ON CONFLICT (item_id) DO UPDATE SET
                   p_value = EXCLUDED.p_value,
                   discrimination = EXCLUDED.discrimination,
                   previous_discrimination = EXCLUDED.previous_discrimination,
                   irt_a = EXCLUDED.irt_a, irt_b = EXCLUDED.irt_b, irt_c = EXCLUDED.irt_c,
                   response_count = EXCLUDED.response_count,
                   validity_status = EXCLUDED.validity_status,
                   difficulty_flag = EXCLUDED.difficulty_flag,
                   discrimination_flag = EXCLUDED.discrimination_flag,
                   status_change_history = EXCLUDED.status_change_history"
            ),
            &[
                &stats.item_id().inner(),
                &stats.p_value(),
                &stats.discrimination(),
                &stats.previous_discrimination(),
                &stats.irt().map(|f| f.a),
                &stats.irt().map(|f| f.b),
                &stats.irt().and_then(|f| f.c),
                &(stats.response_count() as i32),
                &stats.validity_status().as_str(),
                &stats.difficulty_flag().as_str(),
                &stats.discrimination_flag().as_str(),
                &history_json,
            ],
        )
        .await?;
        Ok(())
    }

    async fn items_due_for_analysis(
        &self,
        min_responses: u32,
    ) -> Result<Vec<ID<AssessmentQuestion>>, AssessmentError> {
        let rows = self
            .query(
                const_format::concatcp!(
                    "SELECT item_id FROM ",
                    ITEM_STATISTICS,
                    " WHERE response_count >= $1"
                ),
                &[&(min_responses as i32)],
            )
            .await?;
        Ok(rows
            .iter()
            .map(|row| ID::from(row.get::<_, uuid::Uuid>(0)))
            .collect())
    }

    async fn get_competency_reliability(
        &self,
        competency_id: ID<Competency>,
    ) -> Result<Option<CompetencyReliability>, AssessmentError> {
        let row = self
            .query_opt(
                const_format::concatcp!(
                    "SELECT competency_id, alpha, sample_size, item_count, status, alpha_if_deleted FROM ",
                    COMPETENCY_RELIABILITY,
                    " WHERE competency_id = $1"
                ),
                &[&competency_id.inner()],
            )
            .await?;
        let Some(row) = row else { return Ok(None) };
        let status: String = row.get(4);
        let deleted: serde_json::Value = row.get(5);
        let deleted: BTreeMap<String, f64> =
            serde_json::from_value(deleted).map_err(|e| AssessmentError::internal(e.to_string()))?;
        let sample_size = row.get::<_, i32>(2) as u32;
        let status = decode("status", &status, ReliabilityStatus::parse)?;
        let reliability = CompetencyReliability::new(
            ID::from(row.get::<_, uuid::Uuid>(0)),
            row.get::<_, f64>(1),
            sample_size,
            row.get::<_, i32>(3) as u32,
            sample_size,
            deleted,
        )
        .with_status(status);
        Ok(Some(reliability))
    }

    async fn upsert_competency_reliability(
        &self,
        reliability: &CompetencyReliability,
    ) -> Result<(), AssessmentError> {
        let deleted = serde_json::to_value(reliability.alpha_if_deleted()).unwrap_or_default();
        self.execute(
            const_format::concatcp!(
                "INSERT INTO ",
                COMPETENCY_RELIABILITY,
                " (competency_id, alpha, sample_size, item_count, status, alpha_if_deleted)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 ON CONFLICT (competency_id) DO UPDATE SET
                   alpha = EXCLUDED.alpha, sample_size = EXCLUDED.sample_size,
                   item_count = EXCLUDED.item_count, status = EXCLUDED.status,
                   alpha_if_deleted = EXCLUDED.alpha_if_deleted"
            ),
            &[
                &reliability.competency_id().inner(),
                &reliability.alpha(),
                &(reliability.sample_size() as i32),
                &(reliability.item_count() as i32),
                &reliability.status().as_str(),
                &deleted,
            ],
        )
        .await?;
        Ok(())
    }

    async fn get_big_five_reliability(
        &self,
        trait_: BigFiveTrait,
    ) -> Result<Option<BigFiveReliability>, AssessmentError> {
        let row = self
            .query_opt(
                const_format::concatcp!(
                    "SELECT trait_name, alpha, sample_size, item_count, status FROM ",
                    BIG_FIVE_RELIABILITY,
                    " WHERE trait_name = $1"
                ),
                &[&trait_.as_str()],
            )
            .await?;
        row.as_ref().map(row_to_big_five_reliability).transpose()
    }

    async fn upsert_big_five_reliability(
        &self,
        reliability: &BigFiveReliability,
    ) -> Result<(), AssessmentError> {
        self.execute(
            const_format::concatcp!(
                "INSERT INTO ",
                BIG_FIVE_RELIABILITY,
                " (trait_name, alpha, sample_size, item_count, status)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT (trait_name) DO UPDATE SET
                   alpha = EXCLUDED.alpha, sample_size = EXCLUDED.sample_size,
                   item_count = EXCLUDED.item_count, status = EXCLUDED.status"
            ),
            &[
                &reliability.trait_().as_str(),
                &reliability.alpha(),
                &(reliability.sample_size() as i32),
                &(reliability.item_count() as i32),
                &reliability.status().as_str(),
            ],
        )
        .await?;
        Ok(())
    }

    async fn all_big_five_reliability(&self) -> Result<Vec<BigFiveReliability>, AssessmentError> {
        let rows = self
            .query(
                const_format::concatcp!(
                    "SELECT trait_name, alpha, sample_size, item_count, status FROM ",
                    BIG_FIVE_RELIABILITY
                ),
                &[],
            )
            .await?;
        rows.iter().map(row_to_big_five_reliability).collect()
    }
}

fn row_to_big_five_reliability(row: &Row) -> Result<BigFiveReliability, AssessmentError> {
    let trait_name: String = row.get(0);
    let trait_ = decode("trait_name", &trait_name, BigFiveTrait::parse)?;
    let sample_size = row.get::<_, i32>(2) as u32;
    let status: String = row.get(4);
    let status = decode("status", &status, ReliabilityStatus::parse)?;
    Ok(BigFiveReliability::new(
        trait_,
        row.get::<_, f64>(1),
        sample_size,
        row.get::<_, i32>(3) as u32,
        sample_size,
    )
    .with_status(status))
}
