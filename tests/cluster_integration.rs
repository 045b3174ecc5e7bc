//! Cluster engine integration tests
//!
//! Drives whole engines against the in-memory coordination store: election
//! on cold start, join/leave signaling, failover, split-brain healing,
//! operator adoption, and identity reclamation after a crash restart.

use argus::cluster::Cluster;
use argus::config::ArgusConfig;
use argus::events::EventQueue;
use argus::health::Health;
use argus::overwatch;
use argus::store::{CoordinationStore, MemoryStore, SetOptions};
use argus::types::{DirectorRecord, MemberRecord};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

const INTERVAL: Duration = Duration::from_millis(50);
const TIMEOUT: Duration = Duration::from_millis(200);

const DIRECTOR_KEY: &str = "cluster/director";

struct Member {
    cluster: Arc<Cluster>,
    state_rx: mpsc::Receiver<bool>,
    distribute_rx: mpsc::Receiver<bool>,
    #[allow(dead_code)]
    overwatch_rx: mpsc::Receiver<overwatch::Message>,
    #[allow(dead_code)]
    events: EventQueue,
}

fn engine_config(member_id: &str) -> ArgusConfig {
    let mut config = ArgusConfig::development();
    config.node.member_id = member_id.to_string();
    config.cluster.heartbeat_interval = INTERVAL;
    config.cluster.heartbeat_timeout = TIMEOUT;
    config
}

fn build_member(member_id: &str, store: &MemoryStore) -> Member {
    let config = engine_config(member_id);
    let (state_tx, state_rx) = mpsc::channel(64);
    let (distribute_tx, distribute_rx) = mpsc::channel(64);
    let (overwatch_tx, overwatch_rx) = mpsc::channel(64);
    let events = EventQueue::new(member_id);

    let cluster = Arc::new(
        Cluster::new(
            &config,
            Arc::new(store.clone()),
            state_tx,
            distribute_tx,
            overwatch_tx,
            events.client(),
            Health::new(),
        )
        .unwrap(),
    );

    Member {
        cluster,
        state_rx,
        distribute_rx,
        overwatch_rx,
        events,
    }
}

async fn start_member(member_id: &str, store: &MemoryStore) -> Member {
    let member = build_member(member_id, store);
    member.cluster.start().await.unwrap();
    member
}

async fn expect_state(member: &mut Member, expected: bool, within: Duration) {
    let got = timeout(within, member.state_rx.recv())
        .await
        .expect("state transition within deadline")
        .expect("state channel open");
    assert_eq!(got, expected);
}

async fn director_record(store: &MemoryStore) -> DirectorRecord {
    let payload = store.get(DIRECTOR_KEY).await.unwrap();
    DirectorRecord::from_payload(&payload).unwrap()
}

// =============================================================================
// Election
// =============================================================================

#[tokio::test]
async fn test_cold_start_elects_single_node() {
    let store = MemoryStore::new();
    let mut a = start_member("member-a", &store).await;

    expect_state(&mut a, true, INTERVAL * 4).await;
    assert_eq!(director_record(&store).await.member_id, "member-a");

    // Member registration happened before the election.
    assert!(store.exists("cluster/members/member-a").await.unwrap());
    assert!(store.exists("cluster/members/member-a/config").await.unwrap());
    let status = store.get("cluster/members/member-a/status").await.unwrap();
    assert_eq!(
        MemberRecord::from_payload(&status).unwrap().member_id,
        "member-a"
    );

    a.cluster.stop();
}

#[tokio::test]
async fn test_create_race_elects_exactly_one() {
    let store = MemoryStore::new();
    let mut a = start_member("member-a", &store).await;
    let mut b = start_member("member-b", &store).await;

    tokio::time::sleep(INTERVAL * 6).await;

    let a_director = matches!(a.state_rx.try_recv(), Ok(true));
    let b_director = matches!(b.state_rx.try_recv(), Ok(true));
    assert!(
        a_director ^ b_director,
        "exactly one member must win the election"
    );

    a.cluster.stop();
    b.cluster.stop();
}

// =============================================================================
// Membership changes
// =============================================================================

#[tokio::test]
async fn test_join_signals_redistribution_once() {
    let store = MemoryStore::new();
    let mut a = start_member("member-a", &store).await;
    expect_state(&mut a, true, INTERVAL * 4).await;

    // Let the new director settle into its watch.
    tokio::time::sleep(INTERVAL * 2).await;

    let mut b = start_member("member-b", &store).await;

    let signal = timeout(INTERVAL * 6, a.distribute_rx.recv())
        .await
        .expect("join should signal redistribution")
        .unwrap();
    assert!(signal);

    // Status and config writes keep churning every interval; none of them
    // produce further signals.
    assert!(timeout(INTERVAL * 4, a.distribute_rx.recv()).await.is_err());

    // The non-director neither consumes watch events nor signals.
    assert!(b.state_rx.try_recv().is_err());
    assert!(b.distribute_rx.try_recv().is_err());

    a.cluster.stop();
    b.cluster.stop();
}

#[tokio::test]
async fn test_director_failover() {
    let store = MemoryStore::new();
    let mut a = start_member("member-a", &store).await;
    expect_state(&mut a, true, INTERVAL * 4).await;
    tokio::time::sleep(INTERVAL * 2).await;

    let mut b = start_member("member-b", &store).await;
    timeout(INTERVAL * 6, a.distribute_rx.recv())
        .await
        .expect("join signal on the incumbent")
        .unwrap();

    // Kill the incumbent.
    a.cluster.stop();

    // The survivor takes over once the stale record ages out.
    expect_state(&mut b, true, TIMEOUT + INTERVAL * 8).await;
    assert_eq!(director_record(&store).await.member_id, "member-b");

    // The dead member's directory expires and the new director signals.
    let signal = timeout(TIMEOUT + INTERVAL * 8, b.distribute_rx.recv())
        .await
        .expect("expire should signal redistribution")
        .unwrap();
    assert!(signal);

    b.cluster.stop();
}

#[tokio::test]
async fn test_member_heartbeat_keeps_directory_alive() {
    let store = MemoryStore::new();
    let a = start_member("member-a", &store).await;

    // Several timeouts pass; the refresh keeps the directory present.
    tokio::time::sleep(TIMEOUT * 3).await;
    assert!(store.exists("cluster/members/member-a").await.unwrap());

    a.cluster.stop();

    // Without the heartbeat the directory ages out.
    tokio::time::sleep(TIMEOUT + INTERVAL * 4).await;
    assert!(!store.exists("cluster/members/member-a").await.unwrap());
}

// =============================================================================
// Divergence handling
// =============================================================================

#[tokio::test]
async fn test_split_brain_heals() {
    let store = MemoryStore::new();
    let mut a = start_member("member-a", &store).await;
    expect_state(&mut a, true, INTERVAL * 4).await;

    // An operator reassigns the record to another member and keeps it
    // fresh, so the incumbent can neither clobber it for long nor reclaim
    // it through expiry.
    let writer_store = store.clone();
    let writer = tokio::spawn(async move {
        for _ in 0..100 {
            let foreign = DirectorRecord::new("member-b").to_payload().unwrap();
            let _ = writer_store
                .set(
                    DIRECTOR_KEY,
                    &foreign,
                    SetOptions::default().with_ttl(TIMEOUT),
                )
                .await;
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    });

    // The incumbent demotes itself without touching the record.
    expect_state(&mut a, false, Duration::from_secs(1)).await;
    assert_eq!(director_record(&store).await.member_id, "member-b");

    writer.abort();
    a.cluster.stop();
}

#[tokio::test]
async fn test_operator_adoption() {
    let store = MemoryStore::new();

    // Another member already holds the directorship with a fresh record.
    let foreign = DirectorRecord::new("member-b").to_payload().unwrap();
    store
        .set(
            DIRECTOR_KEY,
            &foreign,
            SetOptions::default().with_ttl(TIMEOUT * 4),
        )
        .await
        .unwrap();

    let mut a = start_member("member-a", &store).await;

    // A waits patiently while the foreign record is fresh.
    assert!(timeout(INTERVAL * 3, a.state_rx.recv()).await.is_err());

    // The operator hands the role over by hand.
    let assigned = DirectorRecord::new("member-a").to_payload().unwrap();
    store
        .set(
            DIRECTOR_KEY,
            &assigned,
            SetOptions::default().with_ttl(TIMEOUT * 4),
        )
        .await
        .unwrap();

    expect_state(&mut a, true, INTERVAL * 4).await;

    // Adoption rewrote the record via CAS with a fresh timestamp.
    let payload = store.get(DIRECTOR_KEY).await.unwrap();
    assert_ne!(payload, assigned);
    assert_eq!(
        DirectorRecord::from_payload(&payload).unwrap().member_id,
        "member-a"
    );

    a.cluster.stop();
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn test_restart_reclaims_identity() {
    let store = MemoryStore::new();

    // Leftovers from a previous run under the same identity.
    store
        .set("cluster/members/member-a", "", SetOptions::dir())
        .await
        .unwrap();
    store
        .set(
            "cluster/members/member-a/status",
            "stale",
            SetOptions::default(),
        )
        .await
        .unwrap();
    store
        .set(
            "cluster/members/member-a/checks/orphan",
            "x",
            SetOptions::default(),
        )
        .await
        .unwrap();

    let mut a = start_member("member-a", &store).await;

    // start() returning means the structure was rebuilt.
    let status = store.get("cluster/members/member-a/status").await.unwrap();
    assert_eq!(
        MemberRecord::from_payload(&status).unwrap().member_id,
        "member-a"
    );
    assert!(!store
        .exists("cluster/members/member-a/checks/orphan")
        .await
        .unwrap());

    expect_state(&mut a, true, INTERVAL * 4).await;
    a.cluster.stop();
}

#[tokio::test]
async fn test_stop_without_start_is_safe() {
    let store = MemoryStore::new();
    let member = build_member("member-a", &store);

    // Nothing was launched; stop must tolerate the missing cancel handle.
    member.cluster.stop();
}
