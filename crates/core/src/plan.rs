// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engagement pacing planner
//!
//! Produces a seeded plan of like/repost actions with inter-action delays
//! and post skips. The uniform strategy spreads actions evenly; the
//! human-like strategy clusters them into sessions separated by long
//! pauses, the way a person drifts in and out of a feed.

use crate::random::Rand;
use serde::{Deserialize, Serialize};

/// Planner inputs with spec defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlanOptions {
    pub number_of_actions: usize,
    /// Seconds, inclusive bounds
    pub delay_range: [u64; 2],
    pub skip_range: [u64; 2],
    /// 0..=100
    pub like_percentage: u8,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            number_of_actions: 10,
            delay_range: [5, 30],
            skip_range: [0, 4],
            like_percentage: 70,
        }
    }
}

/// Pacing strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyKind {
    #[serde(rename = "uniform")]
    Uniform,
    #[serde(rename = "human-like")]
    HumanLike,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Like,
    Repost,
}

/// One step of an engagement plan
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedAction {
    pub action: ActionType,
    /// Sleep before performing this action, in seconds
    pub delay_s: u64,
    /// Feed items to skip over before this action
    pub skip: u64,
    pub index: usize,
    pub executed: bool,
}

/// Ordered action sequence plus totals
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementPlan {
    pub actions: Vec<PlannedAction>,
    pub like_count: usize,
    pub repost_count: usize,
    pub total_time_s: u64,
}

impl EngagementPlan {
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Build a plan with the given strategy, drawing from `rand`
pub fn build_plan(opts: &PlanOptions, strategy: StrategyKind, rand: &impl Rand) -> EngagementPlan {
    let actions = match strategy {
        StrategyKind::Uniform => uniform_actions(opts, rand),
        StrategyKind::HumanLike => human_like_actions(opts, rand),
    };

    let like_count = actions
        .iter()
        .filter(|a| a.action == ActionType::Like)
        .count();
    let total_time_s = actions.iter().map(|a| a.delay_s).sum();

    EngagementPlan {
        repost_count: actions.len() - like_count,
        like_count,
        total_time_s,
        actions,
    }
}

fn like_total(n: usize, percentage: u8) -> usize {
    n * usize::from(percentage.min(100)) / 100
}

fn uniform_actions(opts: &PlanOptions, rand: &impl Rand) -> Vec<PlannedAction> {
    let n = opts.number_of_actions;
    let likes = like_total(n, opts.like_percentage);
    let [dmin, dmax] = opts.delay_range;
    let [smin, smax] = opts.skip_range;

    (0..n)
        .map(|i| PlannedAction {
            action: if i < likes {
                ActionType::Like
            } else {
                ActionType::Repost
            },
            delay_s: rand.pick(dmin, dmax),
            skip: rand.pick(smin, smax),
            index: i,
            executed: false,
        })
        .collect()
}

fn human_like_actions(opts: &PlanOptions, rand: &impl Rand) -> Vec<PlannedAction> {
    let n = opts.number_of_actions;
    if n == 0 {
        return Vec::new();
    }

    let total_likes = like_total(n, opts.like_percentage);
    let [dmin, dmax] = opts.delay_range;
    let [smin, smax] = opts.skip_range;

    // Activity clusters into sessions of roughly five actions
    let sessions = (n / 5).max(1);
    let base = n / sessions;
    let remainder = n % sessions;

    // Delays inside a session are compressed; attention is continuous
    let cmin = (dmin / 2).max(1);
    let cmax = (dmax / 3).max(2).max(cmin);

    let mut actions = Vec::with_capacity(n);
    let mut placed = 0usize;
    let mut assigned_likes = 0usize;

    for si in 0..sessions {
        let size = base + usize::from(si < remainder);
        // Proportional like share with carry so the global counts hold
        let session_likes = total_likes * (placed + size) / n - assigned_likes;

        for j in 0..size {
            let delay_s = if si > 0 && j == 0 {
                // Long pause between sessions
                rand.pick(dmax, 3 * dmax)
            } else {
                rand.pick(cmin, cmax)
            };
            let mut skip = rand.pick(smin, smax);
            if j == 0 {
                // Fresh session starts near the top of the feed
                skip /= 2;
            }
            actions.push(PlannedAction {
                action: if j < session_likes {
                    ActionType::Like
                } else {
                    ActionType::Repost
                },
                delay_s,
                skip,
                index: placed + j,
                executed: false,
            });
        }

        placed += size;
        assigned_likes += session_likes;
    }

    actions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::SeededRand;
    use proptest::prelude::*;
    use yare::parameterized;

    #[test]
    fn uniform_plan_matches_literal_scenario() {
        // N=10, delays [5,30], skips [0,4], 70% likes, seed 42
        let opts = PlanOptions::default();
        let rand = SeededRand::new(42);
        let plan = build_plan(&opts, StrategyKind::Uniform, &rand);

        assert_eq!(plan.len(), 10);
        assert_eq!(plan.like_count, 7);
        assert_eq!(plan.repost_count, 3);
        assert!(plan.actions.iter().all(|a| (5..=30).contains(&a.delay_s)));
        assert!(plan.actions.iter().all(|a| a.skip <= 4));
        assert_eq!(
            plan.total_time_s,
            plan.actions.iter().map(|a| a.delay_s).sum::<u64>()
        );
    }

    #[test]
    fn human_like_plan_matches_literal_scenario() {
        // N=12, delays [10,30], skips [0,3], 75% likes, seed 7
        let opts = PlanOptions {
            number_of_actions: 12,
            delay_range: [10, 30],
            skip_range: [0, 3],
            like_percentage: 75,
        };
        let rand = SeededRand::new(7);
        let plan = build_plan(&opts, StrategyKind::HumanLike, &rand);

        assert_eq!(plan.len(), 12);
        assert_eq!(plan.like_count, 9);
        assert_eq!(plan.repost_count, 3);

        // Two sessions of six; the second opens with a long pause
        let pause = plan.actions[6].delay_s;
        assert!(
            (30..=90).contains(&pause),
            "inter-session pause {} out of range",
            pause
        );

        // In-session delays come from the compressed range [5, 10]
        for action in plan.actions.iter().filter(|a| a.index != 6) {
            assert!(
                (5..=10).contains(&action.delay_s),
                "in-session delay {} out of range",
                action.delay_s
            );
        }
    }

    #[test]
    fn human_like_first_skip_of_session_is_halved() {
        let opts = PlanOptions {
            number_of_actions: 10,
            delay_range: [10, 30],
            skip_range: [4, 4],
            like_percentage: 50,
        };
        let plan = build_plan(&opts, StrategyKind::HumanLike, &SeededRand::new(3));

        // Sessions of five; indexes 0 and 5 open a session
        assert_eq!(plan.actions[0].skip, 2);
        assert_eq!(plan.actions[5].skip, 2);
        assert!(plan
            .actions
            .iter()
            .filter(|a| a.index % 5 != 0)
            .all(|a| a.skip == 4));
    }

    #[parameterized(
        four_actions_one_session = { 4, 1 },
        five_actions_one_session = { 5, 1 },
        nine_actions_one_session = { 9, 1 },
        ten_actions_two_sessions = { 10, 2 },
        twelve_actions_two_sessions = { 12, 2 },
        twenty_five_actions_five_sessions = { 25, 5 },
    )]
    fn session_count_follows_floor_n_over_five(n: usize, expected_sessions: usize) {
        let opts = PlanOptions {
            number_of_actions: n,
            delay_range: [10, 30],
            skip_range: [0, 2],
            like_percentage: 50,
        };
        let plan = build_plan(&opts, StrategyKind::HumanLike, &SeededRand::new(1));

        // A session opener after the first draws from [max, 3*max], which
        // is disjoint from the compressed range for these inputs.
        let long_pauses = plan.actions.iter().filter(|a| a.delay_s >= 30).count();
        assert_eq!(long_pauses, expected_sessions - 1);
    }

    #[test]
    fn seeded_plans_replay_exactly() {
        let opts = PlanOptions::default();
        let a = build_plan(&opts, StrategyKind::HumanLike, &SeededRand::new(11));
        let b = build_plan(&opts, StrategyKind::HumanLike, &SeededRand::new(11));
        assert_eq!(serde_json::to_value(&a).unwrap(), serde_json::to_value(&b).unwrap());
    }

    #[test]
    fn zero_actions_yield_empty_plan() {
        let opts = PlanOptions {
            number_of_actions: 0,
            ..Default::default()
        };
        for strategy in [StrategyKind::Uniform, StrategyKind::HumanLike] {
            let plan = build_plan(&opts, strategy, &SeededRand::new(0));
            assert!(plan.is_empty());
            assert_eq!(plan.like_count, 0);
        }
    }

    #[test]
    fn strategy_names_match_the_wire() {
        assert_eq!(
            serde_json::to_value(StrategyKind::HumanLike).unwrap(),
            "human-like"
        );
        assert_eq!(serde_json::to_value(StrategyKind::Uniform).unwrap(), "uniform");
    }

    proptest! {
        #[test]
        fn plan_totals_hold_for_all_inputs(
            n in 0usize..60,
            dmin in 1u64..20,
            dspan in 0u64..40,
            smin in 0u64..3,
            sspan in 0u64..5,
            p in 0u8..=100,
            seed in 0u64..1000,
            human in proptest::bool::ANY,
        ) {
            let opts = PlanOptions {
                number_of_actions: n,
                delay_range: [dmin, dmin + dspan],
                skip_range: [smin, smin + sspan],
                like_percentage: p,
            };
            let strategy = if human { StrategyKind::HumanLike } else { StrategyKind::Uniform };
            let plan = build_plan(&opts, strategy, &SeededRand::new(seed));

            prop_assert_eq!(plan.len(), n);
            prop_assert_eq!(plan.like_count, n * usize::from(p) / 100);
            prop_assert_eq!(plan.repost_count, n - plan.like_count);
            prop_assert_eq!(plan.like_count + plan.repost_count, n);

            // Skips never exceed the upper bound; human-like may halve below smin
            prop_assert!(plan.actions.iter().all(|a| a.skip <= smin + sspan));
            // Indexes are plan order
            for (i, action) in plan.actions.iter().enumerate() {
                prop_assert_eq!(action.index, i);
                prop_assert!(!action.executed);
            }
        }

        #[test]
        fn uniform_delays_stay_in_range(
            n in 1usize..40,
            dmin in 1u64..30,
            dspan in 0u64..30,
            seed in 0u64..1000,
        ) {
            let opts = PlanOptions {
                number_of_actions: n,
                delay_range: [dmin, dmin + dspan],
                ..Default::default()
            };
            let plan = build_plan(&opts, StrategyKind::Uniform, &SeededRand::new(seed));
            prop_assert!(plan
                .actions
                .iter()
                .all(|a| (dmin..=dmin + dspan).contains(&a.delay_s)));
        }
    }
}
