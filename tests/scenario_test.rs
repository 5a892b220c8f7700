//! End-to-end quest scenarios through the dispatcher.

mod common;

use common::{post, reply_quest, request, TestEngine};
use questline::adapters::network::MockNetworkClient;
use questline::domain::models::{Command, Condition, MonitoredPhrase, Quest, TriggerConfig};
use questline::domain::ports::DomainStore;

fn greet_quest() -> Quest {
    reply_quest("greet")
        .with_condition(Condition::new("hasnt-milestone", vec!["greeted".into()]))
        .with_command(Command::new(
            "record-timeline-entry",
            vec!["greeted".into(), "said hello".into(), "event".into()],
        ))
}

#[tokio::test]
async fn test_greet_quest_executes_once_then_skips() {
    let t = TestEngine::new(MockNetworkClient::new()).await.with_quests(vec![greet_quest()]).await;
    let dispatcher = t.engine.dispatcher();

    let first = dispatcher.process_event(request("did:plc:alder", "r1", "hello!")).await.unwrap();
    assert!(first.success, "{:?}", first.errors);
    assert!(!first.skipped);
    assert_eq!(first.quest_title.as_deref(), Some("greet"));
    assert_eq!(first.executed, vec!["record-timeline-entry"]);

    let timeline = t.store.timeline("did:plc:alder").await.unwrap();
    assert_eq!(timeline.len(), 1);
    assert_eq!(timeline[0].key, "greeted");
    assert_eq!(timeline[0].text, "said hello");

    let second = dispatcher.process_event(request("did:plc:alder", "r2", "hello again")).await.unwrap();
    assert!(second.success);
    assert!(second.skipped);
    assert!(second.executed.is_empty());
    assert_eq!(t.store.timeline("did:plc:alder").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_greet_quest_is_per_user() {
    let t = TestEngine::new(MockNetworkClient::new()).await.with_quests(vec![greet_quest()]).await;
    let dispatcher = t.engine.dispatcher();

    for did in ["did:plc:alder", "did:plc:birch"] {
        let outcome = dispatcher.process_event(request(did, "r1", "hi")).await.unwrap();
        assert!(!outcome.skipped, "{did} should be greeted");
    }
    assert_eq!(t.store.count_users_with_timeline_key("greeted").await.unwrap(), 2);
}

fn phrase_quest() -> Quest {
    Quest::new(
        "flawed-center",
        TriggerConfig::NetworkPhrase {
            phrases: vec![MonitoredPhrase {
                phrase: "#flawedcenter".into(),
                case_sensitive: false,
            }],
        },
    )
    .with_command(Command::new("grant-collectible", vec!["flawed-center".into()]))
}

#[tokio::test]
async fn test_phrase_matches_case_insensitively() {
    let t = TestEngine::new(MockNetworkClient::new()).await.with_quests(vec![phrase_quest()]).await;
    let dispatcher = t.engine.dispatcher();

    let event = post("did:plc:cedar", "p1", "#FlawedCenter rocks");
    assert!(dispatcher.snapshots().load().is_relevant(&event));
    let outcomes = dispatcher.handle_event(&event).await;
    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].success, "{:?}", outcomes[0].errors);
    assert!(t.store.has_collectible("did:plc:cedar", "flawed-center").await.unwrap());
}

#[tokio::test]
async fn test_phrase_does_not_match_spaced_words() {
    let t = TestEngine::new(MockNetworkClient::new()).await.with_quests(vec![phrase_quest()]).await;
    let dispatcher = t.engine.dispatcher();

    let event = post("did:plc:cedar", "p2", "the flawed center of it all");
    assert!(!dispatcher.snapshots().load().is_relevant(&event));
    assert!(dispatcher.handle_event(&event).await.is_empty());
    assert!(!t.store.has_collectible("did:plc:cedar", "flawed-center").await.unwrap());
}

#[tokio::test]
async fn test_registration_flow_with_display_name() {
    let network = MockNetworkClient::new();
    network.add_profile("did:plc:dune", "dune.bsky.social", Some("Sand Walker")).await;
    let quest = reply_quest("arrivals")
        .with_condition(Condition::new("not-registered", vec![]))
        .with_command(Command::new("register", vec![]))
        .with_command(Command::new("like-target-post", vec![]));
    let t = TestEngine::new(network).await.with_quests(vec![quest]).await;

    let outcome = t.engine.dispatcher().process_event(request("did:plc:dune", "r1", "hi")).await.unwrap();
    assert!(outcome.success, "{:?}", outcome.errors);

    let user = t.store.get_user("did:plc:dune").await.unwrap().unwrap();
    assert_eq!(user.handle, "dune.bsky.social");
    assert!(t.store.has_timeline_key("did:plc:dune", "arrival").await.unwrap());
    assert_eq!(t.network.likes().await, vec!["at://did:plc:dune/app.bsky.feed.post/r1"]);

    let again = t.engine.dispatcher().process_event(request("did:plc:dune", "r2", "hi")).await.unwrap();
    assert!(again.skipped);
    assert_eq!(t.network.likes().await.len(), 1);
}

#[tokio::test]
async fn test_disabled_quest_is_not_processed() {
    let t = TestEngine::new(MockNetworkClient::new()).await.with_quests(vec![greet_quest()]).await;
    t.engine.registry().disable("greet").await.unwrap();

    let outcome = t.engine.dispatcher().process_event(request("did:plc:alder", "r1", "hello")).await.unwrap();
    assert!(outcome.skipped);
    assert_eq!(outcome.quest_title, None);
    assert!(t.store.timeline("did:plc:alder").await.unwrap().is_empty());
}
