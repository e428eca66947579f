use std::error::Error;

use descry::*;
use futures_lite::future::block_on;
use wgpu::{
    DeviceDescriptor, Features, Instance, InstanceDescriptor, Limits, PowerPreference,
    RequestAdapterOptions,
};

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let paths: Vec<String> = std::env::args().skip(1).collect();
    if paths.is_empty() {
        eprintln!("usage: descry-inspect <module.spv>...");
        std::process::exit(2);
    }

    let mut modules = vec![];
    for path in &paths {
        let bytes = std::fs::read(path)?;
        let module = Reflection::parse(&bytes).map_err(|err| format!("{path}: {err}"))?;

        println!("{path}");
        for entry_point in &module.entry_points {
            println!("  {:?} entry point `{}`", entry_point.stage, entry_point.name);
        }
        for binding in &module.bindings {
            println!(
                "  set {} binding {}: {:?}",
                binding.set, binding.binding, binding.kind
            );
        }

        modules.push(module);
    }

    let modules: Vec<&Reflection> = modules.iter().collect();
    let merged = MergedLayout::merge(&modules)?;
    println!("merged layout for {:?}", merged.stages());
    for (set, slots) in merged.sets().enumerate() {
        println!("  set {set}: {slots:?}");
    }

    let instance = Instance::new(InstanceDescriptor::default());
    let adapter = block_on(instance.request_adapter(&RequestAdapterOptions {
        power_preference: PowerPreference::HighPerformance,
        force_fallback_adapter: false,
        compatible_surface: None,
    }));
    let Some(adapter) = adapter else {
        println!("no adapter available, not creating layouts");
        return Ok(());
    };
    let (device, queue) = block_on(adapter.request_device(
        &DeviceDescriptor {
            label: Some("descry-inspect"),
            features: Features::default(),
            limits: Limits::default(),
        },
        None,
    ))?;

    let mut ctx = BindingContext::new(WgpuApi::new(&device, &queue), BindingConfig::default())?;
    match ctx.pipeline_layout(&modules) {
        Ok(info) => println!("created a pipeline layout with {} set layouts", info.sets.len()),
        Err(err) => println!("layout not supported on wgpu: {err}"),
    }
    ctx.destroy_all();

    Ok(())
}
