//! Module loading and action dispatch through a whole server context.

mod common;

use common::{TestClient, TestServer};
use meshirc_proto::ModeType;
use meshircd::error::RegistryError;
use meshircd::modules::{ActionSpec, Arg, ChannelModeSpec, Module, SimpleMode, Targets, action_fn};
use std::cell::RefCell;
use std::rc::Rc;

fn server() -> TestServer {
    TestServer::new("hub.test.net", "0AA", &[], &[])
}

/// Declares a ban mode of its own, which the core already provides.
struct BanClash;

impl Module for BanClash {
    fn name(&self) -> &'static str {
        "BanClash"
    }

    fn channel_modes(&self) -> Vec<ChannelModeSpec> {
        vec![
            ChannelModeSpec::new('Q', ModeType::NoParam, Rc::new(SimpleMode)),
            ChannelModeSpec::new('b', ModeType::List, Rc::new(SimpleMode)),
        ]
    }

    fn actions(&self) -> Vec<ActionSpec> {
        vec![ActionSpec::new("clash-probe", 0, action_fn(|_, _| Some(true)))]
    }
}

#[test]
fn conflicting_module_installs_nothing() {
    let mut s = server();
    let err = s.matrix.load_module(Rc::new(BanClash)).unwrap_err();
    assert!(matches!(
        err,
        RegistryError::ModeConflict { letter: 'b', ref owner, .. } if owner == "RfcChannelModes"
    ));
    assert!(!s.matrix.registry.is_loaded("BanClash"));
    assert!(s.matrix.registry.channel_mode('Q').is_none());
    assert!(!s.matrix.registry.has_action("clash-probe"));
}

/// Records the order its handlers run in and returns fixed votes.
struct Recorder {
    log: Rc<RefCell<Vec<&'static str>>>,
}

impl Module for Recorder {
    fn name(&self) -> &'static str {
        "Recorder"
    }

    fn actions(&self) -> Vec<ActionSpec> {
        let entry = |label: &'static str, priority: i32, result: Option<bool>| {
            let log = Rc::clone(&self.log);
            ActionSpec::new(
                "probe",
                priority,
                action_fn(move |_, _| {
                    log.borrow_mut().push(label);
                    result
                }),
            )
        };
        vec![
            entry("low", 5, Some(false)),
            entry("first-high", 10, Some(true)),
            entry("second-high", 10, Some(true)),
            entry("abstain", 7, None),
        ]
    }
}

fn recorder(s: &mut TestServer) -> Rc<RefCell<Vec<&'static str>>> {
    let log = Rc::new(RefCell::new(Vec::new()));
    s.matrix
        .load_module(Rc::new(Recorder { log: Rc::clone(&log) }))
        .expect("Recorder loads");
    log
}

#[test]
fn handlers_run_by_priority_then_registration() {
    let mut s = server();
    let log = recorder(&mut s);
    s.matrix.run_action_standard("probe", &[], &Targets::none());
    assert_eq!(*log.borrow(), vec!["first-high", "second-high", "abstain", "low"]);
}

#[test]
fn voting_sums_and_empty_is_zero() {
    let mut s = server();
    assert_eq!(s.matrix.run_action_voting("probe", &[], &Targets::none()), 0);
    let _log = recorder(&mut s);
    assert_eq!(s.matrix.run_action_voting("probe", &[], &Targets::none()), 1);
}

#[test]
fn until_semantics_stop_at_sentinel() {
    let mut s = server();
    let log = recorder(&mut s);

    assert!(s.matrix.run_action_until_true("probe", &[], &Targets::none()));
    assert_eq!(*log.borrow(), vec!["first-high"]);

    log.borrow_mut().clear();
    assert!(!s.matrix.run_action_until_false("probe", &[], &Targets::none()));
    assert_eq!(*log.borrow(), vec!["first-high", "second-high", "abstain", "low"]);

    assert!(s.matrix.run_action_flag_true("probe", &[], &Targets::none()));
    assert!(s.matrix.run_action_flag_false("probe", &[], &Targets::none()));
    assert!(!s.matrix.run_action_until_true("missing", &[], &Targets::none()));
    assert!(s.matrix.run_action_until_false("missing", &[], &Targets::none()));
}

/// Takes one name from the collection per handler.
struct Drainer;

impl Module for Drainer {
    fn name(&self) -> &'static str {
        "Drainer"
    }

    fn actions(&self) -> Vec<ActionSpec> {
        (0..5)
            .map(|_| {
                ActionSpec::new(
                    "drain",
                    0,
                    action_fn(|_, args| {
                        if let Some(list) = args.texts_mut(0) {
                            list.pop();
                        }
                        None
                    }),
                )
            })
            .collect()
    }
}

#[test]
fn processing_stops_once_drained() {
    let mut s = server();
    s.matrix.load_module(Rc::new(Drainer)).expect("Drainer loads");
    let mut data = Arg::Texts(vec!["a".into(), "b".into()]);
    s.matrix
        .run_action_processing("drain", &mut data, &[], &Targets::none());
    assert!(data.is_drained());

    let mut many = [Arg::Texts(vec!["a".into()]), Arg::Texts(vec!["b".into(), "c".into()])];
    s.matrix
        .run_action_processing_multiple("drain", &mut many, &[], &Targets::none());
    // Handlers only touch the first collection; the second keeps its items.
    assert!(many[0].is_drained());
    assert!(!many[1].is_drained());
}

#[test]
fn unload_removes_everything_and_core_stays() {
    let mut s = server();
    let _log = recorder(&mut s);
    assert!(s.matrix.registry.has_action("probe"));
    s.matrix.unload_module("Recorder", true).expect("unloads");
    assert!(!s.matrix.registry.has_action("probe"));
    assert!(!s.matrix.registry.is_loaded("Recorder"));

    let err = s.matrix.unload_module("CoreCommands", true).unwrap_err();
    assert_eq!(err, RegistryError::CoreModule("CoreCommands".into()));
    assert!(s.matrix.registry.is_loaded("CoreCommands"));
}

#[test]
fn command_permission_can_veto() {
    let mut s = server();
    s.matrix
        .load_module(Rc::new(NoJoin))
        .expect("NoJoin loads");
    let alice = TestClient::connect(&mut s.matrix, "alice");
    assert!(alice.send(&mut s.matrix, "join", &["#rust"]));
    assert!(s.matrix.channels.is_empty());
}

struct NoJoin;

impl Module for NoJoin {
    fn name(&self) -> &'static str {
        "NoJoin"
    }

    fn actions(&self) -> Vec<ActionSpec> {
        vec![ActionSpec::new(
            "commandpermission-JOIN",
            0,
            action_fn(|_, args| match args.params.get(1) {
                Some(Arg::Data(data)) if data.contains_key("channels") => Some(false),
                _ => None,
            }),
        )]
    }
}

#[test]
fn unknown_commands_are_reported() {
    let mut s = server();
    let mut alice = TestClient::connect(&mut s.matrix, "alice");
    assert!(!alice.send(&mut s.matrix, "FROBNICATE", &[]));
    assert_eq!(alice.numerics(), vec![421]);
}
