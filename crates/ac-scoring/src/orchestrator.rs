//! Scoring Orchestrator: the single entry point that turns a `Completed`
//! session into a `TestResult` (spec §4.F). The five steps run in order and
//! never roll back one another — a failure past step 2 still leaves the
//! session itself intact, and the audit/activity/passport writes at the end
//! are all best-effort so a storage hiccup there can never erase a result
//! that already made it into `ResultRepository`.
use crate::result::competency_breakdown_to_json;
use crate::result::ResultRepository;
use crate::result::TestResult;
use crate::result::TestResultStatus;
use crate::scoring;
use crate::strategy::GoalStrategy;
use crate::strategy::ScoringContext;
use ac_activity::append_best_effort;
use ac_activity::record_best_effort;
use ac_activity::ActivityEvent;
use ac_activity::ActivityEventKind;
use ac_activity::ActivitySink;
use ac_activity::AuditSink;
use ac_activity::ScoringAuditLog;
use ac_blueprint::Blueprint;
use ac_blueprint::Goal;
use ac_blueprint::ONetProfile;
use ac_blueprint::TeamProfile;
use ac_blueprint::TemplateRepository;
use ac_blueprint::TestTemplate;
use ac_core::AssessmentError;
use ac_core::Unique;
use ac_core::ID;
use ac_items::AssessmentQuestion;
use ac_items::BehavioralIndicator;
use ac_items::BigFiveReliability;
use ac_items::Competency;
use ac_items::ItemRepository;
use ac_passport::CompetencyPassport;
use ac_passport::PassportRepository;
use ac_session::AnswerRepository;
use ac_session::SessionRepository;
use ac_session::SessionStatus;
use ac_session::TestAnswer;
use ac_session::TestSession;
use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use std::collections::BTreeMap;
use std::time::Instant;

/// Fetches the O*NET benchmark for a Job-Fit template's occupation code.
/// The lookup itself lives outside the assessment core (spec §1 Non-goals);
/// this crate only needs bounded retries and a `Degraded` fallback when the
/// provider stays unavailable (spec §4.F).
#[async_trait]
pub trait OnetProfileProvider: Send + Sync {
    async fn fetch(&self, occupation_code: &str) -> Result<ONetProfile, AssessmentError>;
}

/// Fetches a team's saturation/personality profile for a Team-Fit template.
#[async_trait]
pub trait TeamProfileProvider: Send + Sync {
    async fn fetch(&self, team_id: &str) -> Result<TeamProfile, AssessmentError>;
}

/// Everything the orchestrator needs, gathered behind trait objects rather
/// than generics: unlike the Session Engine's two-repository pairing, this
/// is a fan-in of six storage seams plus two best-effort sinks and two
/// external providers, and none of the underlying traits carry a generic
/// method — `dyn` keeps the constructor signature readable.
pub struct ScoringOrchestrator<'r> {
    templates: &'r dyn TemplateRepository,
    sessions: &'r dyn SessionRepository,
    answers: &'r dyn AnswerRepository,
    items: &'r dyn ItemRepository,
    results: &'r dyn ResultRepository,
    passports: &'r dyn PassportRepository,
    audit: &'r dyn AuditSink,
    activity: &'r dyn ActivitySink,
    onet_provider: &'r dyn OnetProfileProvider,
    team_provider: &'r dyn TeamProfileProvider,
}

impl<'r> ScoringOrchestrator<'r> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        templates: &'r dyn TemplateRepository,
        sessions: &'r dyn SessionRepository,
        answers: &'r dyn AnswerRepository,
        items: &'r dyn ItemRepository,
        results: &'r dyn ResultRepository,
        passports: &'r dyn PassportRepository,
        audit: &'r dyn AuditSink,
        activity: &'r dyn ActivitySink,
        onet_provider: &'r dyn OnetProfileProvider,
        team_provider: &'r dyn TeamProfileProvider,
    ) -> Self {
        Self {
            templates,
            sessions,
            answers,
            items,
            results,
            passports,
            audit,
            activity,
            onet_provider,
            team_provider,
        }
    }

    /// Spec §4.F: score a completed session exactly once.
    ///
    /// 1. At-most-one-result check (early return on re-entry).
    /// 2. Load the session, its template, and every answer; dispatch to the
    ///    template's `GoalStrategy`.
    /// 3. Persist the `TestResult` and append a `ScoringAuditLog`.
    /// 4. Upsert the candidate's `CompetencyPassport`, when the goal calls
    ///    for it.
    /// 5. Record a `SessionCompleted` activity event.
    pub async fn complete(&self, session_id: ID<TestSession>, now: DateTime<Utc>) -> Result<TestResult, AssessmentError> {
        if let Some(existing) = self.results.get_by_session(session_id).await? {
            return Ok(existing);
        }

        let started = Instant::now();

        let session = self
            .sessions
            .get(session_id)
            .await?
            .ok_or_else(|| AssessmentError::not_found("TestSession", session_id.inner().to_string()))?;
        if session.status() != SessionStatus::Completed {
            return Err(AssessmentError::invalid_state("session must be Completed before it can be scored"));
        }

        let template = self
            .templates
            .get_version(session.template_id(), session.template_version())
            .await?
            .ok_or_else(|| AssessmentError::not_found("TestTemplate", session.template_id().inner().to_string()))?;

        let answers = self.answers.list_for_session(session_id).await?;
        let questions = self.items.get_items(session.question_order()).await?;
        let (indicators, competencies) = self.load_catalog(&questions).await?;
        let big_five_reliabilities = self.items.all_big_five_reliability().await?;

        let user_id = session.owner().clerk_user_id().map(str::to_string);
        let existing_passport = match &user_id {
            Some(uid) => self.passports.get_passport(uid).await?,
            None => None,
        };
        let existing_passport_scores = existing_passport
            .as_ref()
            .filter(|p| ac_passport::effective(p, now).is_some())
            .map(|p| p.scores().clone())
            .unwrap_or_default();

        let (outcome, status, passport_max_age_days) = match template.blueprint() {
            Blueprint::Overview { .. } => {
                let ctx = context(&template, &questions, &answers, &indicators, &competencies, &big_five_reliabilities, &existing_passport_scores);
                (GoalStrategy::Overview.score(&ctx), TestResultStatus::Completed, 180)
            }
            Blueprint::JobFit {
                onet_occupation_code,
                passport_max_age_days,
                ..
            } => {
                let (onet, status) = self.fetch_onet_or_degrade(onet_occupation_code).await;
                let ctx = context(&template, &questions, &answers, &indicators, &competencies, &big_five_reliabilities, &existing_passport_scores);
                (GoalStrategy::JobFit { onet: &onet }.score(&ctx), status, *passport_max_age_days)
            }
            Blueprint::TeamFit { team_id } => {
                let (team, status) = self.fetch_team_or_degrade(team_id).await;
                let ctx = context(&template, &questions, &answers, &indicators, &competencies, &big_five_reliabilities, &existing_passport_scores);
                (GoalStrategy::TeamFit { team: &team }.score(&ctx), status, 180)
            }
        };

        let answered_count = answers.iter().filter(|a| !a.is_skipped()).count() as u32;
        let skipped_count = answers.iter().filter(|a| a.is_skipped()).count() as u32;
        let total_time_seconds: u32 = answers.iter().map(|a| a.time_spent_seconds()).sum();

        // Snapshot the population before this result joins it, so the
        // candidate never counts as its own prior.
        let priors = self.results.overall_percentages_for_template(template.id()).await?;

        let result = TestResult::new(
            session_id,
            template.id(),
            template.goal(),
            user_id.clone(),
            status,
            outcome.overall_score,
            outcome.overall_percentage,
            outcome.passed,
            outcome.competency_breakdown.clone(),
            outcome.big_five_profile.clone(),
            outcome.extended_metrics.clone(),
            answered_count,
            skipped_count,
            total_time_seconds,
            now,
        );
        let mut persisted = self.results.insert_if_absent(result).await?;

        // Percentile is decorated onto the response only, never persisted.
        if matches!(template.goal(), Goal::Overview) {
            persisted = persisted.with_percentile(scoring::percentile_rank(&priors, persisted.overall_percentage()));
        }

        let audit_log = ScoringAuditLog::new(
            session_id,
            persisted.id().inner(),
            template.id(),
            template.goal(),
            outcome.strategy_tag,
            outcome.weights_snapshot,
            competency_breakdown_to_json(&outcome.competency_breakdown),
            serde_json::to_value(template.blueprint()).unwrap_or_default(),
            answered_count,
            skipped_count,
            started.elapsed().as_millis() as u64,
            now,
        );
        append_best_effort(self.audit, audit_log).await;

        if let Some(uid) = &user_id {
            if self.upserts_passport_for(template.blueprint()) {
                let passport = CompetencyPassport::upsert(
                    existing_passport,
                    uid.clone(),
                    outcome.competency_breakdown.iter().map(|(&id, b)| (id, b.percentage)).collect(),
                    outcome.big_five_profile.clone(),
                    persisted.id().inner(),
                    passport_max_age_days,
                    now,
                );
                if let Err(err) = ac_core::retry::with_default_backoff(|| async { self.passports.upsert_passport(&passport).await }).await {
                    log::error!("passport upsert for {uid} dropped: {err}");
                }
            }
        }

        record_best_effort(
            self.activity,
            ActivityEvent::new(
                ActivityEventKind::SessionCompleted,
                session_id,
                template.id(),
                user_id,
                now,
                serde_json::json!({
                    "status": status.as_str(),
                    "overallPercentage": persisted.overall_percentage(),
                    "passed": persisted.passed(),
                }),
            ),
        )
        .await;

        Ok(persisted)
    }

    /// Spec §4.I: a passport is always refreshed from an Overview run; a
    /// Job-Fit run only contributes when delta-testing is explicitly
    /// flagged on, and a Team-Fit run never writes one back (its score is
    /// relative to one team, not a portable per-user signal).
    fn upserts_passport_for(&self, blueprint: &Blueprint) -> bool {
        match blueprint {
            Blueprint::Overview { .. } => true,
            Blueprint::JobFit { delta_testing_enabled, .. } => *delta_testing_enabled,
            Blueprint::TeamFit { .. } => false,
        }
    }

    /// Resolves every indicator and competency the session's questions
    /// touch, in the fewest repository round trips (one per distinct
    /// indicator, deduplicated as they're discovered).
    async fn load_catalog(
        &self,
        questions: &[AssessmentQuestion],
    ) -> Result<
        (
            BTreeMap<ID<BehavioralIndicator>, BehavioralIndicator>,
            BTreeMap<ID<Competency>, Competency>,
        ),
        AssessmentError,
    > {
        let mut indicators = BTreeMap::new();
        let mut competencies = BTreeMap::new();
        for question in questions {
            if indicators.contains_key(&question.indicator_id()) {
                continue;
            }
            let Some(indicator) = self.items.get_indicator(question.indicator_id()).await? else {
                continue;
            };
            if !competencies.contains_key(&indicator.competency_id()) {
                if let Some(competency) = self.items.get_competency(indicator.competency_id()).await? {
                    competencies.insert(competency.id(), competency);
                }
            }
            indicators.insert(indicator.id(), indicator);
        }
        Ok((indicators, competencies))
    }

    async fn fetch_onet_or_degrade(&self, occupation_code: &str) -> (ONetProfile, TestResultStatus) {
        match ac_core::retry::with_default_backoff(|| async { self.onet_provider.fetch(occupation_code).await }).await {
            Ok(profile) => (profile, TestResultStatus::Completed),
            Err(err) => {
                log::warn!("O*NET profile for {occupation_code} unavailable after retries, marking result Degraded: {err}");
                (ONetProfile::new(occupation_code.to_string(), BTreeMap::new(), BTreeMap::new()), TestResultStatus::Degraded)
            }
        }
    }

    async fn fetch_team_or_degrade(&self, team_id: &str) -> (TeamProfile, TestResultStatus) {
        match ac_core::retry::with_default_backoff(|| async { self.team_provider.fetch(team_id).await }).await {
            Ok(profile) => (profile, TestResultStatus::Completed),
            Err(err) => {
                log::warn!("team profile for {team_id} unavailable after retries, marking result Degraded: {err}");
                (TeamProfile::new(team_id.to_string(), vec![], BTreeMap::new(), BTreeMap::new(), None), TestResultStatus::Degraded)
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn context<'a>(
    template: &'a TestTemplate,
    questions: &'a [AssessmentQuestion],
    answers: &'a [TestAnswer],
    indicators: &'a BTreeMap<ID<BehavioralIndicator>, BehavioralIndicator>,
    competencies: &'a BTreeMap<ID<Competency>, Competency>,
    big_five_reliabilities: &'a [BigFiveReliability],
    existing_passport_scores: &'a BTreeMap<ID<Competency>, f64>,
) -> ScoringContext<'a> {
    ScoringContext {
        template,
        questions,
        answers,
        indicators,
        competencies,
        big_five_reliabilities,
        existing_passport_scores,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::InMemoryResultRepository;
    use ac_activity::InMemoryActivitySink;
    use ac_activity::InMemoryAuditSink;
    use ac_blueprint::InMemoryTemplateRepository;
    use ac_blueprint::Visibility;
    use ac_items::AnswerOption;
    use ac_items::DifficultyBand;
    use ac_items::InMemoryItemRepository;
    use ac_items::QuestionType;
    use ac_items::ScoringRubric;
    use ac_passport::InMemoryPassportRepository;
    use ac_session::AnswerPayload;
    use ac_session::InMemoryAnswerRepository;
    use ac_session::InMemorySessionRepository;
    use ac_session::SessionOwner;
    use std::collections::BTreeSet;

    struct UnreachableOnet;
    #[async_trait]
    impl OnetProfileProvider for UnreachableOnet {
        async fn fetch(&self, _occupation_code: &str) -> Result<ONetProfile, AssessmentError> {
            Err(AssessmentError::internal("onet service unavailable"))
        }
    }
    struct UnreachableTeam;
    #[async_trait]
    impl TeamProfileProvider for UnreachableTeam {
        async fn fetch(&self, _team_id: &str) -> Result<TeamProfile, AssessmentError> {
            Err(AssessmentError::internal("team service unavailable"))
        }
    }

    async fn seed_overview_session() -> (
        InMemoryTemplateRepository,
        InMemorySessionRepository,
        InMemoryAnswerRepository,
        InMemoryItemRepository,
        ID<TestSession>,
    ) {
        let templates = InMemoryTemplateRepository::new();
        let sessions = InMemorySessionRepository::new();
        let answers = InMemoryAnswerRepository::new();
        let items = InMemoryItemRepository::new();

        let competency_id = ID::default();
        let indicator = BehavioralIndicator::new(ID::default(), competency_id, "Listens".into(), ac_items::ContextScope::Universal);
        items.insert_indicator(indicator.clone());
        items.insert_competency(Competency::new(competency_id, "Teamwork".into(), None));

        let mut question_order = Vec::new();
        for _ in 0..3 {
            let q = AssessmentQuestion::new(
                ID::default(),
                indicator.id(),
                "text".into(),
                QuestionType::Likert,
                vec![],
                ScoringRubric::Likert,
                DifficultyBand::Foundational,
                60,
            )
            .unwrap();
            items.insert_item(q.clone());
            question_order.push(q.id());
        }

        let template = TestTemplate::new(
            ID::default(),
            "Engineering Overview".into(),
            "clerk_owner".into(),
            Visibility::Private,
            Blueprint::Overview { include_big_five: false },
            BTreeSet::new(),
            3,
            1800,
            50.0,
        );
        templates.upsert(&template).await.unwrap();

        let session = TestSession::start(
            ID::default(),
            template.id(),
            template.version(),
            SessionOwner::Member("clerk_1".into()),
            question_order.clone(),
            7,
            1800,
            None,
            None,
            DateTime::UNIX_EPOCH,
        );
        let session_id = session.id();
        sessions.insert(&session).await.unwrap();
        let mut stored = sessions.get(session_id).await.unwrap().unwrap();
        stored.complete(DateTime::UNIX_EPOCH).unwrap();
        sessions.update(&stored).await.unwrap();

        for &question_id in &question_order {
            answers
                .upsert(&TestAnswer::new(session_id, question_id, AnswerPayload::Likert(6), DateTime::UNIX_EPOCH, 10))
                .await
                .unwrap();
        }

        (templates, sessions, answers, items, session_id)
    }

    #[tokio::test]
    async fn completing_an_overview_session_produces_a_passing_result_and_a_passport() {
        let (templates, sessions, answers, items, session_id) = seed_overview_session().await;
        let results = InMemoryResultRepository::new();
        let passports = InMemoryPassportRepository::new();
        let audit = InMemoryAuditSink::new();
        let activity = InMemoryActivitySink::new();

        let orchestrator = ScoringOrchestrator::new(
            &templates, &sessions, &answers, &items, &results, &passports, &audit, &activity, &UnreachableOnet, &UnreachableTeam,
        );

        let result = orchestrator.complete(session_id, DateTime::UNIX_EPOCH).await.unwrap();
        assert_eq!(result.status(), TestResultStatus::Completed);
        assert!(result.passed());
        assert!(result.percentile().is_some());

        let passport = passports.get_passport("clerk_1").await.unwrap();
        assert!(passport.is_some());

        let audit_log = audit.get_for_session(session_id).await.unwrap();
        assert!(audit_log.is_some());
        let event_log = activity.list_for_session(session_id).await.unwrap();
        assert_eq!(event_log.len(), 1);
    }

    #[tokio::test]
    async fn re_entry_returns_the_same_result_without_rescoring() {
        let (templates, sessions, answers, items, session_id) = seed_overview_session().await;
        let results = InMemoryResultRepository::new();
        let passports = InMemoryPassportRepository::new();
        let audit = InMemoryAuditSink::new();
        let activity = InMemoryActivitySink::new();

        let orchestrator = ScoringOrchestrator::new(
            &templates, &sessions, &answers, &items, &results, &passports, &audit, &activity, &UnreachableOnet, &UnreachableTeam,
        );

        let first = orchestrator.complete(session_id, DateTime::UNIX_EPOCH).await.unwrap();
        let second = orchestrator.complete(session_id, DateTime::UNIX_EPOCH + chrono::Duration::days(1)).await.unwrap();
        assert_eq!(first.id(), second.id());
        // Only one activity event: the second call short-circuited before
        // step 5 ever ran again.
        assert_eq!(activity.list_for_session(session_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn job_fit_falls_back_to_degraded_when_onet_is_unreachable() {
        let templates = InMemoryTemplateRepository::new();
        let sessions = InMemorySessionRepository::new();
        let answers = InMemoryAnswerRepository::new();
        let items = InMemoryItemRepository::new();
        let results = InMemoryResultRepository::new();
        let passports = InMemoryPassportRepository::new();
        let audit = InMemoryAuditSink::new();
        let activity = InMemoryActivitySink::new();

        let competency_id = ID::default();
        let indicator = BehavioralIndicator::new(ID::default(), competency_id, "Scopes work".into(), ac_items::ContextScope::Universal);
        items.insert_indicator(indicator.clone());
        items.insert_competency(Competency::new(competency_id, "Delivery".into(), None));
        let question = AssessmentQuestion::new(
            ID::default(),
            indicator.id(),
            "text".into(),
            QuestionType::MultipleChoice,
            vec![AnswerOption { id: "yes".into(), text: "Yes".into() }],
            ScoringRubric::OptionScores(BTreeMap::from([("yes".to_string(), 0.8)])),
            DifficultyBand::Foundational,
            60,
        )
        .unwrap();
        items.insert_item(question.clone());

        let template = TestTemplate::new(
            ID::default(),
            "Backend Engineer".into(),
            "clerk_owner".into(),
            Visibility::Private,
            Blueprint::JobFit {
                onet_occupation_code: "15-1252.00".into(),
                delta_testing_enabled: false,
                delta_skip_threshold: 0.0,
                strictness_level: 50,
                passport_max_age_days: 180,
            },
            BTreeSet::new(),
            3,
            1800,
            50.0,
        );
        templates.upsert(&template).await.unwrap();

        let session = TestSession::start(
            ID::default(),
            template.id(),
            template.version(),
            SessionOwner::Member("clerk_2".into()),
            vec![question.id()],
            3,
            1800,
            None,
            None,
            DateTime::UNIX_EPOCH,
        );
        let session_id = session.id();
        sessions.insert(&session).await.unwrap();
        let mut stored = sessions.get(session_id).await.unwrap().unwrap();
        stored.complete(DateTime::UNIX_EPOCH).unwrap();
        sessions.update(&stored).await.unwrap();
        answers
            .upsert(&TestAnswer::new(session_id, question.id(), AnswerPayload::SelectedOptions(vec!["yes".into()]), DateTime::UNIX_EPOCH, 10))
            .await
            .unwrap();

        let orchestrator = ScoringOrchestrator::new(
            &templates, &sessions, &answers, &items, &results, &passports, &audit, &activity, &UnreachableOnet, &UnreachableTeam,
        );
        let result = orchestrator.complete(session_id, DateTime::UNIX_EPOCH).await.unwrap();
        assert_eq!(result.status(), TestResultStatus::Degraded);
        assert!(!result.passed());
    }
}
