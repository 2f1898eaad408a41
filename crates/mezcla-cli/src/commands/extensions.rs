//! Extension registry listing command.

use std::sync::Arc;

use clap::Args;
use mezcla_core::{Backend, ContextAttributes, Engine, EngineSettings, NullBackend};

#[derive(Args)]
pub struct ExtensionsArgs {
    /// Check a single procedure or group name
    #[arg(value_name = "NAME")]
    name: Option<String>,

    /// Emit JSON instead of a table
    #[arg(long)]
    json: bool,
}

pub fn run(args: ExtensionsArgs) -> anyhow::Result<()> {
    // Built-ins are registered with the first context.
    let engine = Engine::with_backends(
        EngineSettings {
            sync: true,
            devices: vec!["null".into()],
            ..EngineSettings::default()
        },
        vec![Arc::new(NullBackend::new()) as Arc<dyn Backend>],
    );
    let ctx = engine.create_context(&ContextAttributes::default())?;
    let groups = engine.extension_groups();
    let procs = engine.extension_names();
    engine.destroy_context(ctx)?;

    if let Some(name) = args.name {
        let is_group = groups.contains(&name);
        let is_proc = procs.contains(&name);
        if !is_group && !is_proc {
            anyhow::bail!("'{}' is not a registered extension", name);
        }
        let kind = if is_group { "group" } else { "procedure" };
        println!("{name}: registered {kind}");
        return Ok(());
    }

    if args.json {
        let json = serde_json::json!({
            "groups": groups,
            "procedures": procs,
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }

    println!("Extension Groups");
    println!("================\n");
    for group in &groups {
        println!("  {group}");
    }
    println!("\nProcedures");
    println!("==========\n");
    for name in &procs {
        println!("  {name}");
    }
    println!("\nTotal: {} group(s), {} procedure(s)", groups.len(), procs.len());
    Ok(())
}
