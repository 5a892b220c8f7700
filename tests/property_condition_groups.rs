//! Property tests for how condition operators combine.

use std::sync::Arc;

use proptest::prelude::*;
use questline::adapters::sqlite::{create_migrated_test_pool, SqliteDomainStore};
use questline::domain::models::{
    Condition, ConditionOperator, EvaluationContext, Quest, ReplyEvent, TimelineEntry, TriggerConfig, TriggerType,
};
use questline::domain::ports::DomainStore;
use questline::services::ConditionEvaluator;

const DID: &str = "did:plc:prop";

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap()
}

fn quest(conditions: Vec<Condition>) -> Quest {
    let mut quest = Quest::new(
        "prop",
        TriggerConfig::ReplyToPost {
            post_uri: "at://did:plc:q/app.bsky.feed.post/1".into(),
            known_authors_only: false,
        },
    );
    quest.conditions = conditions;
    quest
}

/// One `has-milestone` condition per flag; the milestone exists exactly when the flag is set.
async fn evaluate(and_flags: &[bool], or_flags: &[bool]) -> bool {
    let pool = create_migrated_test_pool().await.unwrap();
    let store = Arc::new(SqliteDomainStore::new(pool));
    let mut conditions = Vec::new();

    for (group, flags, operator) in [("and", and_flags, ConditionOperator::And), ("or", or_flags, ConditionOperator::Or)] {
        for (i, pass) in flags.iter().enumerate() {
            let key = format!("{group}-{i}");
            if *pass {
                store
                    .insert_timeline_if_absent(&TimelineEntry::new(DID, &key, "milestone", "seeded"))
                    .await
                    .unwrap();
            }
            conditions.push(Condition::new("has-milestone", vec![key]).with_operator(operator));
        }
    }

    let ctx = EvaluationContext::new(
        TriggerType::ReplyToPost,
        vec![ReplyEvent::new("at://did:plc:prop/app.bsky.feed.post/r", DID, "prop.test", "hi", "")],
    );
    ConditionEvaluator::new(store)
        .evaluate(&quest(conditions), &ctx)
        .await
        .unwrap()
        .success
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// An AND-only group succeeds exactly when every condition passes.
    #[test]
    fn prop_and_group_requires_all(flags in prop::collection::vec(any::<bool>(), 1..6)) {
        let rt = runtime();
        let success = rt.block_on(evaluate(&flags, &[]));
        prop_assert_eq!(success, flags.iter().all(|f| *f));
    }

    /// Mixed groups need every AND condition and at least one OR condition.
    #[test]
    fn prop_mixed_and_or(
        and_flags in prop::collection::vec(any::<bool>(), 0..4),
        or_flags in prop::collection::vec(any::<bool>(), 1..4),
    ) {
        let rt = runtime();
        let success = rt.block_on(evaluate(&and_flags, &or_flags));
        let expected = and_flags.iter().all(|f| *f) && or_flags.iter().any(|f| *f);
        prop_assert_eq!(success, expected);
    }
}
