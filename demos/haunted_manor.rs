//! Walk the Hollow Manor story along a fixed route: validate it, lay it
//! out, play it with the variable runtime and a small renderer plugin,
//! then save and resume.
//!
//! Run with `cargo run --example haunted_manor`.

use storyloom::core::engine::{ResolvedChoice, TraversalEngine};
use storyloom::core::layout::{layout_story, HierarchicalConfig, LayoutMode, RadialConfig};
use storyloom::core::plugin::{
    HookName, HookPayload, Plugin, PluginCategory, PluginContext, PluginError, PluginMetadata,
    PluginRuntime,
};
use storyloom::core::validator::validate_story;
use storyloom::plugins::{get_variable, RuntimePlugin};
use storyloom::schema::save::SaveState;
use storyloom::schema::story::Story;

const STORY: &str = include_str!("../tests/fixtures/haunted_manor.ron");

/// Renders node text as a boxed card.
struct CardRenderer {
    meta: PluginMetadata,
}

fn card(text: &str, choices: &[ResolvedChoice]) -> String {
    let width = text.chars().count().max(20);
    let mut out = format!("+{}+\n| {:<width$} |\n", "-".repeat(width + 2), text);
    for (n, choice) in choices.iter().enumerate() {
        out.push_str(&format!("|   {}. {:<w$} |\n", n + 1, choice.text, w = width - 5));
    }
    out.push_str(&format!("+{}+", "-".repeat(width + 2)));
    out
}

impl Plugin for CardRenderer {
    fn metadata(&self) -> &PluginMetadata {
        &self.meta
    }

    fn hooks(&self) -> &[HookName] {
        &[HookName::ContentRender]
    }

    fn on_hook(
        &mut self,
        payload: HookPayload,
        _ctx: &mut PluginContext,
    ) -> Result<HookPayload, PluginError> {
        match payload {
            HookPayload::ContentRender {
                node_id,
                text,
                available_choices,
                ..
            } => Ok(HookPayload::ContentRender {
                rendered_html: Some(card(&text, &available_choices)),
                node_id,
                text,
                available_choices,
            }),
            other => Ok(other),
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let story = Story::parse_ron(STORY)?;

    let report = validate_story(&story);
    println!(
        "Validation: {} errors, {} warnings",
        report.errors.len(),
        report.warnings.len()
    );
    for warning in report.warning_messages() {
        println!("  WARNING: {}", warning);
    }

    let laid_out = layout_story(
        &story,
        LayoutMode::Hierarchical,
        &HierarchicalConfig::default(),
        &RadialConfig::default(),
    );
    println!("\nLayout:");
    for node in &laid_out {
        println!("  {:<7} ({:>6.0}, {:>6.0})", node.id, node.position.x, node.position.y);
    }

    let mut runtime = PluginRuntime::default();
    runtime.register(Box::new(RuntimePlugin::with_seed(42)))?;
    runtime.register(Box::new(CardRenderer {
        meta: PluginMetadata::new("theme.cards", PluginCategory::Theme).name("Card renderer"),
    }))?;

    let mut engine = TraversalEngine::new(story, runtime);
    let mut saved: Option<SaveState> = None;

    let mut node = engine.start(None)?;
    for choice in ["bribe", "return", "enter", "stairs"] {
        if let Some(card) = engine.render(&node) {
            println!("\n{}", card);
        }
        if choice == "enter" {
            saved = Some(engine.save()?);
        }
        println!("> {}", choice);
        node = engine.make_choice(choice)?;
    }
    if let Some(card) = engine.render(&node) {
        println!("\n{}", card);
    }

    let ctx = engine.runtime().context();
    println!(
        "\nCoins left: {}, lantern: {}",
        get_variable(ctx, "coins").unwrap_or_default(),
        get_variable(ctx, "lantern").unwrap_or_default()
    );

    if let Some(state) = saved {
        println!("\nResuming from the save taken at the gate...");
        let node = engine.load(state)?;
        println!("{}", node.text);
        println!("History: {}", engine.history().join(" -> "));
    }

    Ok(())
}
