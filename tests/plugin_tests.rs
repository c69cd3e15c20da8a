/// Plugin runtime integration tests: the built-in variable runtime playing
/// the manor fixture, and host-side plugin management.
use std::path::PathBuf;

use futures::executor::block_on;
use serde_json::json;
use storyloom::config::StoryloomConfig;
use storyloom::core::engine::{CurrentNode, TraversalEngine};
use storyloom::core::plugin::{
    HookPayload, Plugin, PluginCategory, PluginMetadata, PluginRuntime,
};
use storyloom::plugins::{get_variable, set_variable, RuntimePlugin, RUNTIME_PLUGIN_ID};
use storyloom::schema::save::SaveState;
use storyloom::schema::story::Story;

fn manor() -> Story {
    Story::load(&PathBuf::from("tests/fixtures/haunted_manor.ron")).unwrap()
}

fn manor_engine() -> TraversalEngine {
    let mut runtime = PluginRuntime::default();
    runtime.register(Box::new(RuntimePlugin::with_seed(11))).unwrap();
    TraversalEngine::new(manor(), runtime)
}

fn choice_ids(node: &CurrentNode) -> Vec<&str> {
    node.choices.iter().map(|c| c.id.as_str()).collect()
}

#[test]
fn lantern_route_reaches_the_attic() {
    let mut engine = manor_engine();

    let gate = engine.start(None).unwrap();
    assert!(gate.text.ends_with("You carry 3 coins."));
    assert_eq!(choice_ids(&gate), ["enter", "bribe"]);

    let shed = engine.make_choice("bribe").unwrap();
    assert_eq!(shed.id, "shed");
    let ctx = engine.runtime().context();
    assert_eq!(get_variable(ctx, "coins"), Some(json!(1)));
    assert_eq!(get_variable(ctx, "lantern"), Some(json!(true)));

    let gate = engine.make_choice("return").unwrap();
    assert!(gate.text.ends_with("You carry 1 coins."));
    assert_eq!(choice_ids(&gate), ["enter"]);

    let hall = engine.make_choice("enter").unwrap();
    assert_eq!(hall.text, "Lantern light finds a staircase and a cellar door.");
    assert_eq!(choice_ids(&hall), ["stairs", "cellar", "leave"]);

    let attic = engine.make_choice("stairs").unwrap();
    assert!(attic.is_ending());
    assert!(attic.text.ends_with("Visits to the hall: 1."));
}

#[test]
fn darkness_hides_the_stairs() {
    let mut engine = manor_engine();
    engine.start(None).unwrap();
    let hall = engine.make_choice("enter").unwrap();
    assert_eq!(hall.text, "The hall is too dark to see.");
    assert_eq!(choice_ids(&hall), ["cellar", "leave"]);
}

#[test]
fn variables_survive_a_save_file() {
    let mut engine = manor_engine();
    engine.start(None).unwrap();
    engine.make_choice("bribe").unwrap();
    let json = engine.save().unwrap().to_json().unwrap();
    assert!(json.contains("\"$variables\""));

    let mut fresh = manor_engine();
    let shed = fresh.load(SaveState::from_json(&json).unwrap()).unwrap();
    assert_eq!(shed.id, "shed");
    assert_eq!(get_variable(fresh.runtime().context(), "lantern"), Some(json!(true)));
}

#[test]
fn host_variables_shape_the_next_resolution() {
    let mut engine = manor_engine();
    engine.start(None).unwrap();
    set_variable(engine.runtime_mut().context_mut(), "coins", json!(1)).unwrap();
    let gate = engine.current_node().unwrap();
    assert_eq!(choice_ids(&gate), ["enter"]);
    assert!(gate.text.ends_with("You carry 1 coins."));

    // zero coins is falsy, so the gate's onEnter refills the purse
    set_variable(engine.runtime_mut().context_mut(), "coins", json!(0)).unwrap();
    let gate = engine.current_node().unwrap();
    assert_eq!(choice_ids(&gate), ["enter", "bribe"]);
}

struct Theme {
    meta: PluginMetadata,
}

impl Theme {
    fn boxed(id: &str) -> Box<dyn Plugin> {
        Box::new(Theme {
            meta: PluginMetadata::new(id, PluginCategory::Theme).requires(RUNTIME_PLUGIN_ID),
        })
    }
}

impl Plugin for Theme {
    fn metadata(&self) -> &PluginMetadata {
        &self.meta
    }
}

#[test]
fn dependencies_and_exclusive_themes() {
    let config = StoryloomConfig::load_from_ron(&PathBuf::from("tests/fixtures/storyloom.ron")).unwrap();
    let mut runtime = config.runtime();

    assert!(runtime.register(Theme::boxed("theme.dusk")).is_err());
    assert!(!runtime.has_plugin("theme.dusk"));

    runtime.register(Box::new(RuntimePlugin::with_seed(1))).unwrap();
    runtime.register(Theme::boxed("theme.dusk")).unwrap();
    runtime.register(Theme::boxed("theme.dawn")).unwrap();
    assert!(runtime.is_enabled("theme.dusk"));
    assert!(!runtime.is_enabled("theme.dawn"));

    runtime.enable("theme.dawn").unwrap();
    let enabled: Vec<&str> = runtime.enabled_plugins().map(|p| p.id()).collect();
    assert_eq!(enabled, [RUNTIME_PLUGIN_ID, "theme.dawn"]);

    let exported = runtime.export_config();
    assert!(!exported["theme.dusk"].enabled);
    assert!(exported[RUNTIME_PLUGIN_ID].enabled);
}

#[test]
fn async_dispatch_matches_sync() {
    let mut runtime = PluginRuntime::default();
    runtime.register(Box::new(RuntimePlugin::with_seed(5))).unwrap();
    set_variable(runtime.context_mut(), "name", json!("Mara")).unwrap();

    let payload = HookPayload::ContentProcess {
        node_id: "gate".into(),
        text: "Welcome, {{$vars.name}}.".into(),
    };
    let sync = runtime.trigger(payload.clone());
    let async_result = block_on(runtime.trigger_async(payload));
    assert_eq!(sync, async_result);
    match sync {
        HookPayload::ContentProcess { text, .. } => assert_eq!(text, "Welcome, Mara."),
        other => panic!("unexpected payload {:?}", other),
    }
}
