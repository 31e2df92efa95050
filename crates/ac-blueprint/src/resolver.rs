use crate::AssemblyPlan;
use crate::Blueprint;
use crate::ONetProfile;
use crate::PlannedCompetency;
use crate::TeamProfile;
use crate::TestTemplate;
use ac_core::AssessmentError;
use ac_core::ID;
use ac_items::Competency;
use ac_items::DifficultyBand;
use ac_passport::CompetencyPassport;
use chrono::DateTime;
use chrono::Utc;
use std::collections::BTreeMap;

/// Runtime context a [`BlueprintResolver`] resolves a template against (spec
/// §4.C: `userClerkId`, optional `TeamProfile`, optional `ONetProfile`,
/// optional `CompetencyPassport`).
pub struct ResolutionContext {
    pub user_clerk_id: String,
    pub team_profile: Option<TeamProfile>,
    pub onet_profile: Option<ONetProfile>,
    pub passport: Option<CompetencyPassport>,
    pub now: DateTime<Utc>,
}

/// Turns a goal-typed [`TestTemplate`] into a concrete [`AssemblyPlan`]
/// (spec §4.C). Stateless — all runtime dependencies arrive via
/// [`ResolutionContext`], so this never touches a repository directly.
pub struct BlueprintResolver;

impl BlueprintResolver {
    pub fn resolve(
        template: &TestTemplate,
        context: &ResolutionContext,
    ) -> Result<AssemblyPlan, AssessmentError> {
        match template.blueprint() {
            Blueprint::Overview { include_big_five } => {
                Ok(Self::resolve_overview(template, *include_big_five))
            }
            Blueprint::JobFit { .. } => Self::resolve_job_fit(template, context),
            Blueprint::TeamFit { team_id } => Self::resolve_team_fit(template, context, team_id),
        }
    }

    fn resolve_overview(template: &TestTemplate, include_big_five: bool) -> AssemblyPlan {
        let competencies = template
            .competency_ids()
            .iter()
            .map(|&competency_id| PlannedCompetency {
                competency_id,
                weight: 1.0,
            })
            .collect();
        AssemblyPlan {
            competencies,
            bands: DifficultyBand::core_three().to_vec(),
            include_big_five,
            imported_from_passport: BTreeMap::new(),
        }
    }

    fn resolve_job_fit(
        template: &TestTemplate,
        context: &ResolutionContext,
    ) -> Result<AssemblyPlan, AssessmentError> {
        let Blueprint::JobFit {
            delta_testing_enabled,
            delta_skip_threshold,
            ..
        } = template.blueprint()
        else {
            unreachable!("caller matched on Blueprint::JobFit")
        };
        let onet = context
            .onet_profile
            .as_ref()
            .ok_or_else(|| AssessmentError::precondition_failed("job-fit template requires an O*NET profile"))?;

        let benchmarked: Vec<ID<Competency>> = onet.benchmarked_competencies().copied().collect();
        let candidates: Vec<ID<Competency>> = if template.competency_ids().is_empty() {
            benchmarked
        } else {
            benchmarked
                .into_iter()
                .filter(|id| template.competency_ids().contains(id))
                .collect()
        };

        let weights = onet.importance_weights();
        let effective_passport = context
            .passport
            .as_ref()
            .filter(|p| ac_passport::effective(p, context.now).is_some());

        let mut competencies = Vec::new();
        let mut imported_from_passport = BTreeMap::new();
        for competency_id in candidates {
            let passport_score = effective_passport.and_then(|p| p.score_for(competency_id));
            if let Some(score) = passport_score.filter(|&s| *delta_testing_enabled && s >= *delta_skip_threshold) {
                imported_from_passport.insert(competency_id, score);
                continue;
            }
            competencies.push(PlannedCompetency {
                competency_id,
                weight: weights.get(&competency_id).copied().unwrap_or(0.0),
            });
        }
        competencies.sort_by(|a, b| b.weight.total_cmp(&a.weight));

        Ok(AssemblyPlan {
            competencies,
            bands: DifficultyBand::core_three().to_vec(),
            include_big_five: false,
            imported_from_passport,
        })
    }

    fn resolve_team_fit(
        template: &TestTemplate,
        context: &ResolutionContext,
        _team_id: &str,
    ) -> Result<AssemblyPlan, AssessmentError> {
        let team = context
            .team_profile
            .as_ref()
            .ok_or_else(|| AssessmentError::precondition_failed("team-fit template requires a team profile"))?;

        let mut competency_ids: Vec<ID<Competency>> = team.undersaturated();
        for &override_id in template.competency_ids() {
            if !competency_ids.contains(&override_id) {
                competency_ids.push(override_id);
            }
        }

        let mut competencies: Vec<PlannedCompetency> = competency_ids
            .into_iter()
            .map(|competency_id| PlannedCompetency {
                competency_id,
                weight: 1.0 - team.saturation_of(competency_id),
            })
            .collect();
        // Lowest-saturation (highest weight) competencies lead the question order.
        competencies.sort_by(|a, b| b.weight.total_cmp(&a.weight));

        Ok(AssemblyPlan {
            competencies,
            bands: DifficultyBand::core_three().to_vec(),
            include_big_five: false,
            imported_from_passport: BTreeMap::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Visibility;
    use std::collections::BTreeSet;

    fn ctx() -> ResolutionContext {
        ResolutionContext {
            user_clerk_id: "clerk_1".into(),
            team_profile: None,
            onet_profile: None,
            passport: None,
            now: DateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn overview_spans_core_three_bands() {
        let template = TestTemplate::new(
            ID::default(),
            "Overview".into(),
            "clerk_owner".into(),
            Visibility::Public,
            Blueprint::Overview {
                include_big_five: true,
            },
            BTreeSet::new(),
            3,
            1800,
            70.0,
        );
        let plan = BlueprintResolver::resolve(&template, &ctx()).unwrap();
        assert_eq!(plan.bands, DifficultyBand::core_three().to_vec());
        assert!(plan.include_big_five);
    }

    #[test]
    fn job_fit_without_onet_profile_is_precondition_failed() {
        let template = TestTemplate::new(
            ID::default(),
            "JobFit".into(),
            "clerk_owner".into(),
            Visibility::Public,
            Blueprint::JobFit {
                onet_occupation_code: "15-1252.00".into(),
                delta_testing_enabled: false,
                delta_skip_threshold: 80.0,
                strictness_level: 50,
                passport_max_age_days: 180,
            },
            BTreeSet::new(),
            3,
            1800,
            70.0,
        );
        let err = BlueprintResolver::resolve(&template, &ctx()).unwrap_err();
        assert_eq!(err.status_hint(), 412);
    }

    #[test]
    fn job_fit_delta_skips_competencies_above_threshold() {
        let comp_a = ID::default();
        let comp_b = ID::default();
        let mut required = BTreeMap::new();
        required.insert(comp_a, 0.8);
        required.insert(comp_b, 0.6);
        let onet = ONetProfile::new("15-1252.00".into(), required, BTreeMap::new());

        let mut scores = BTreeMap::new();
        scores.insert(comp_a, 92.0);
        let passport = CompetencyPassport::upsert(
            None,
            "clerk_1",
            scores,
            None,
            uuid::Uuid::now_v7(),
            180,
            DateTime::UNIX_EPOCH,
        );

        let template = TestTemplate::new(
            ID::default(),
            "JobFit".into(),
            "clerk_owner".into(),
            Visibility::Public,
            Blueprint::JobFit {
                onet_occupation_code: "15-1252.00".into(),
                delta_testing_enabled: true,
                delta_skip_threshold: 85.0,
                strictness_level: 50,
                passport_max_age_days: 180,
            },
            BTreeSet::new(),
            3,
            1800,
            70.0,
        );
        let mut context = ctx();
        context.onet_profile = Some(onet);
        context.passport = Some(passport);

        let plan = BlueprintResolver::resolve(&template, &context).unwrap();
        assert_eq!(plan.imported_from_passport.get(&comp_a), Some(&92.0));
        assert!(plan.competencies.iter().any(|c| c.competency_id == comp_b));
        assert!(!plan.competencies.iter().any(|c| c.competency_id == comp_a));
    }

    #[test]
    fn team_fit_biases_toward_lowest_saturation() {
        let low = ID::default();
        let high = ID::default();
        let mut saturation = BTreeMap::new();
        saturation.insert(low, 0.1);
        saturation.insert(high, 0.9);
        let team = TeamProfile::new("team-1".into(), vec![], saturation, BTreeMap::new(), None);

        let template = TestTemplate::new(
            ID::default(),
            "TeamFit".into(),
            "clerk_owner".into(),
            Visibility::Public,
            Blueprint::TeamFit {
                team_id: "team-1".into(),
            },
            BTreeSet::new(),
            3,
            1800,
            70.0,
        );
        let mut context = ctx();
        context.team_profile = Some(team);

        let plan = BlueprintResolver::resolve(&template, &context).unwrap();
        assert_eq!(plan.competencies[0].competency_id, low);
        assert_eq!(plan.competencies[1].competency_id, high);
    }

    #[test]
    fn team_fit_without_team_profile_is_precondition_failed() {
        let template = TestTemplate::new(
            ID::default(),
            "TeamFit".into(),
            "clerk_owner".into(),
            Visibility::Public,
            Blueprint::TeamFit {
                team_id: "team-1".into(),
            },
            BTreeSet::new(),
            3,
            1800,
            70.0,
        );
        let err = BlueprintResolver::resolve(&template, &ctx()).unwrap_err();
        assert_eq!(err.status_hint(), 412);
    }
}
