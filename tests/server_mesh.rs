//! Linking, bursting and splitting small in-process meshes.

mod common;

use common::{TestClient, TestNet, TestServer};
use meshirc_proto::{LinkMessage, ServerId, UserUuid};

const A: (&str, &str) = ("a.test.net", "0AA");
const B: (&str, &str) = ("b.test.net", "1BB");
const C: (&str, &str) = ("c.test.net", "2CC");
const D: (&str, &str) = ("d.test.net", "3DD");

fn sid(s: &str) -> ServerId {
    ServerId::parse(s).expect("valid sid")
}

#[test]
fn uuids_are_server_prefixed_and_sequential() {
    let mut net = TestNet::new(&[A], &[]);
    let first = TestClient::connect(net.matrix(0), "alice");
    let second = TestClient::connect(net.matrix(0), "bob");
    assert_eq!(first.uuid.as_str(), "0AAAAAAAA");
    assert_eq!(second.uuid.as_str(), "0AAAAAAAB");
    assert_eq!(first.uuid.server_id(), sid("0AA"));
}

#[test]
fn link_bursts_users_and_channels() {
    let mut net = TestNet::new(&[A, B], &["ChannelOpAccess"]);
    let alice = TestClient::connect(net.matrix(0), "alice");
    alice.send(net.matrix(0), "JOIN", &["#mesh"]);
    alice.send(net.matrix(0), "TOPIC", &["#mesh", "linked up"]);
    alice.send(net.matrix(0), "MODE", &["#mesh", "+ntb", "*!*@spam.example"]);

    net.link(0, 1);

    let b = net.matrix(1);
    assert!(b.sync.topology.contains(&sid("0AA")));
    assert!(b.sync.topology.get(&sid("0AA")).is_some_and(|n| n.bursted));
    let channel = &b.channels["#mesh"];
    assert_eq!(channel.status(&alice.uuid), Some("o"));
    assert!(channel.modes.has('n') && channel.modes.has('t'));
    assert_eq!(channel.modes.list('b')[0].param, "*!*@spam.example");
    assert_eq!(channel.topic.as_ref().map(|t| t.text.as_str()), Some("linked up"));
    assert_eq!(b.find_user("alice"), Some(alice.uuid.clone()));
}

#[test]
fn live_changes_propagate_after_link() {
    let mut net = TestNet::new(&[A, B], &[]);
    net.link(0, 1);
    let mut alice = TestClient::connect(net.matrix(0), "alice");
    let mut bob = TestClient::connect(net.matrix(1), "bob");
    net.pump();

    alice.send(net.matrix(0), "JOIN", &["#live"]);
    net.pump();
    bob.send(net.matrix(1), "JOIN", &["#live"]);
    net.pump();
    alice.send(net.matrix(0), "MODE", &["#live", "+v", "bob"]);
    net.pump();

    for idx in 0..2 {
        let channel = &net.matrix(idx).channels["#live"];
        assert_eq!(channel.status(&alice.uuid), Some("o"));
        assert_eq!(channel.status(&bob.uuid), Some("v"));
    }
    // Bob sees the change rendered with his nick.
    let modes = bob.events("MODE");
    assert_eq!(modes.last(), Some(&vec!["#live".to_string(), "+v".into(), "bob".into()]));

    bob.send(net.matrix(1), "PART", &["#live", "bye"]);
    net.pump();
    assert!(!net.matrix(0).channels["#live"].is_member(&bob.uuid));
    let _ = alice.drain();
}

#[test]
fn module_mismatch_refuses_link() {
    let mut net = TestNet::default();
    let peers = [A.0, B.0];
    net.add(TestServer::new(A.0, A.1, &["ChannelOpAccess"], &peers));
    net.add(TestServer::new(B.0, B.1, &[], &peers));
    let wire = net.link(0, 1);
    let (on_a, on_b) = net.link_ids(wire);

    assert!(!net.is_up(wire));
    // Both ends drop the attempt, the initiator once it reads the refusal.
    assert!(net.matrix(0).sync.link(on_a).is_none());
    assert!(net.matrix(1).sync.link(on_b).is_none());
    for idx in 0..2 {
        let m = net.matrix(idx);
        assert!(m.sync.topology.is_empty());
        assert_eq!(m.sync.peers().count(), 0);
    }
}

#[test]
fn bad_password_refuses_link() {
    let mut net = TestNet::new(&[A, B], &[]);
    net.matrix(1).links[0].incoming_password = "other".into();
    let wire = net.link(0, 1);
    assert!(!net.is_up(wire));
    assert!(!net.matrix(0).sync.topology.contains(&sid("1BB")));
    assert!(!net.matrix(1).sync.topology.contains(&sid("0AA")));
}

#[test]
fn chain_learns_whole_tree_and_routes() {
    let mut net = TestNet::new(&[A, B, C], &[]);
    net.link(0, 1);
    net.link(1, 2);

    let a = net.matrix(0);
    let c_node = a.sync.topology.get(&sid("2CC")).expect("A knows C");
    assert_eq!(c_node.hop_count, 2);
    assert_eq!(c_node.next_closest, sid("1BB"));
    assert_eq!(a.route(&sid("2CC")), Some(sid("1BB")));

    let c = net.matrix(2);
    assert_eq!(c.sync.topology.get(&sid("0AA")).map(|n| n.hop_count), Some(2));
    assert_eq!(c.route(&sid("0AA")), Some(sid("1BB")));
}

#[test]
fn split_prunes_everything_behind_the_link() {
    let mut net = TestNet::new(&[A, B, C], &[]);
    net.link(0, 1);
    let bc = net.link(1, 2);

    let mut alice = TestClient::connect(net.matrix(0), "alice");
    let carol = TestClient::connect(net.matrix(2), "carol");
    net.pump();
    alice.send(net.matrix(0), "JOIN", &["#split"]);
    net.pump();
    carol.send(net.matrix(2), "JOIN", &["#split"]);
    net.pump();
    assert!(net.matrix(0).channels["#split"].is_member(&carol.uuid));
    alice.drain();

    net.cut(bc);

    for idx in 0..2 {
        let m = net.matrix(idx);
        assert!(!m.sync.topology.contains(&sid("2CC")));
        assert!(!m.users.contains_key(&carol.uuid));
        assert!(m.find_user("carol").is_none());
    }
    assert!(!net.matrix(0).channels["#split"].is_member(&carol.uuid));
    let quits = alice.events("QUIT");
    assert_eq!(quits, vec![vec!["b.test.net c.test.net".to_string()]]);

    let c = net.matrix(2);
    assert!(c.sync.topology.is_empty());
    assert!(!c.users.contains_key(&alice.uuid));
    assert!(!c.channels["#split"].is_member(&alice.uuid));

    let a = net.matrix(0);
    assert!(a.sync.topology.contains(&sid("1BB")));
    assert_eq!(a.route(&sid("1BB")), Some(sid("1BB")));
}

#[test]
fn split_at_a_hub_reaches_every_other_leaf_once() {
    let mut net = TestNet::new(&[A, B, C, D], &[]);
    net.link(0, 1);
    let bc = net.link(1, 2);
    net.link(1, 3);

    let mut alice = TestClient::connect(net.matrix(0), "alice");
    let carol = TestClient::connect(net.matrix(2), "carol");
    let mut dave = TestClient::connect(net.matrix(3), "dave");
    net.pump();
    for (idx, client) in [(0, &alice), (2, &carol), (3, &dave)] {
        client.send(net.matrix(idx), "JOIN", &["#star"]);
        net.pump();
    }
    alice.drain();
    dave.drain();

    net.cut(bc);

    for idx in [0, 1, 3] {
        let m = net.matrix(idx);
        assert!(!m.sync.topology.contains(&sid("2CC")), "server {idx}");
        assert!(!m.users.contains_key(&carol.uuid), "server {idx}");
        assert!(!m.channels["#star"].is_member(&carol.uuid), "server {idx}");
    }
    for (idx, other) in [(0, "3DD"), (3, "0AA")] {
        let m = net.matrix(idx);
        assert!(m.sync.topology.contains(&sid("1BB")), "server {idx}");
        assert!(m.sync.topology.contains(&sid(other)), "server {idx}");
    }
    assert!(net.matrix(0).users.contains_key(&dave.uuid));
    assert!(net.matrix(3).users.contains_key(&alice.uuid));

    let expected = vec![vec!["b.test.net c.test.net".to_string()]];
    assert_eq!(alice.events("QUIT"), expected);
    assert_eq!(dave.events("QUIT"), expected);
}

#[test]
fn split_records_must_arrive_from_the_route() {
    let mut net = TestNet::new(&[A, B, C], &[]);
    let ab = net.link(0, 1);
    net.link(1, 2);
    let carol = TestClient::connect(net.matrix(2), "carol");
    net.pump();

    // C sits behind B's link to C, not behind the link to A.
    let (_, b_from_a) = net.link_ids(ab);
    net.matrix(1)
        .handle_link_message(b_from_a, LinkMessage::ServerDisconnected { sid: sid("2CC") });
    net.pump();

    for idx in 0..2 {
        let m = net.matrix(idx);
        assert!(m.sync.topology.contains(&sid("2CC")), "server {idx}");
        assert!(m.users.contains_key(&carol.uuid), "server {idx}");
    }
}

#[test]
fn older_channel_wins_burst_conflict() {
    let mut net = TestNet::new(&[A, B], &[]);
    let alice = TestClient::connect(net.matrix(0), "alice");
    let bob = TestClient::connect(net.matrix(1), "bob");
    alice.send(net.matrix(0), "JOIN", &["#x"]);
    bob.send(net.matrix(1), "JOIN", &["#x"]);
    alice.send(net.matrix(0), "MODE", &["#x", "+m"]);
    bob.send(net.matrix(1), "MODE", &["#x", "+s"]);
    net.matrix(0).channels.get_mut("#x").expect("#x on A").created = 1_000;
    net.matrix(1).channels.get_mut("#x").expect("#x on B").created = 2_000;

    net.link(0, 1);

    for idx in 0..2 {
        let channel = &net.matrix(idx).channels["#x"];
        assert_eq!(channel.created, 1_000, "server {idx}");
        assert_eq!(channel.status(&alice.uuid), Some("o"), "server {idx}");
        assert_eq!(channel.status(&bob.uuid), Some(""), "server {idx}");
        assert!(channel.modes.has('m'), "server {idx}");
        assert!(!channel.modes.has('s'), "server {idx}");
    }
}

#[test]
fn older_channel_wins_beyond_the_merging_link() {
    let mut net = TestNet::new(&[A, B, C], &[]);
    net.link(1, 2);
    let bob = TestClient::connect(net.matrix(2), "bob");
    bob.send(net.matrix(2), "JOIN", &["#x"]);
    net.pump();
    bob.send(net.matrix(2), "MODE", &["#x", "+s"]);
    net.pump();
    for idx in 1..3 {
        net.matrix(idx).channels.get_mut("#x").expect("#x on B and C").created = 2_000;
    }

    let alice = TestClient::connect(net.matrix(0), "alice");
    alice.send(net.matrix(0), "JOIN", &["#x"]);
    alice.send(net.matrix(0), "MODE", &["#x", "+m"]);
    net.matrix(0).channels.get_mut("#x").expect("#x on A").created = 1_000;

    net.link(0, 1);

    for idx in 0..3 {
        let channel = &net.matrix(idx).channels["#x"];
        assert_eq!(channel.created, 1_000, "server {idx}");
        assert!(channel.modes.has('m'), "server {idx}");
        assert!(!channel.modes.has('s'), "server {idx}");
        assert_eq!(channel.status(&alice.uuid), Some("o"), "server {idx}");
        assert_eq!(channel.status(&bob.uuid), Some(""), "server {idx}");
    }
}

#[test]
fn burst_nick_collision_renames_the_younger() {
    let mut net = TestNet::new(&[A, B], &[]);
    let old = TestClient::connect(net.matrix(0), "dup");
    let mut young = TestClient::connect(net.matrix(1), "dup");
    if let Some(u) = net.matrix(0).users.get_mut(&old.uuid) {
        u.nick_ts = 10;
    }
    if let Some(u) = net.matrix(1).users.get_mut(&young.uuid) {
        u.nick_ts = 20;
    }

    net.link(0, 1);

    for idx in 0..2 {
        let m = net.matrix(idx);
        assert_eq!(m.find_user("dup"), Some(old.uuid.clone()), "server {idx}");
        assert_eq!(m.users[&young.uuid].nick, young.uuid.as_str(), "server {idx}");
    }
    assert!(young.numerics().contains(&436));
}

#[test]
fn records_before_handshake_are_rejected() {
    let mut s = TestServer::new(A.0, A.1, &[], &[B.0]);
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let id = s.matrix.open_link(tx, None, None).expect("inbound link");
    s.matrix.handle_link_message(
        id,
        LinkMessage::RemoveUser {
            uuid: UserUuid::parse("1BBAAAAAA").expect("valid uuid"),
            reason: "gone".into(),
        },
    );
    match rx.try_recv() {
        Ok(LinkMessage::ErrorReply { code, .. }) => assert_eq!(code, "HANDSHAKE_NOT_COMPLETE"),
        other => panic!("expected error reply, got {other:?}"),
    }
    assert!(s.matrix.sync.link(id).is_some());
}
