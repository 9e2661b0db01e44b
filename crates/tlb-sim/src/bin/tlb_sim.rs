use anyhow::{Context, Result};
use std::time::Duration;
use tlb_core::TlbConfig;
use tlb_sim::{leaf_spine_scenario, Fabric, FabricConfig, Outage};

fn usage() -> &'static str {
    "usage: tlb-sim [--config engine.toml] [--seed N] [--paths N] [--hot N] \
     [--flows N] [--packets N] [--duration-ms N] [--fail-path N --fail-from-ms N \
     --fail-until-ms N] [--output report.json] [--metrics]"
}

fn next_value<T>(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = args
        .next()
        .with_context(|| format!("missing value for {flag}"))?;
    raw.parse::<T>()
        .with_context(|| format!("invalid value for {flag}: {raw}"))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(true)
        .compact()
        .init();

    let mut config_path: Option<String> = None;
    let mut output: Option<String> = None;
    let mut seed = 1u64;
    let mut n_paths = 4usize;
    let mut hot = 1usize;
    let mut flows = 8usize;
    let mut packets = 200u32;
    let mut duration_ms = 50u64;
    let mut metrics = false;
    let mut fail_path: Option<usize> = None;
    let mut fail_from_ms = 10u64;
    let mut fail_until_ms = 20u64;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => config_path = Some(next_value(&mut args, "--config")?),
            "--output" => output = Some(next_value(&mut args, "--output")?),
            "--seed" => seed = next_value(&mut args, "--seed")?,
            "--paths" => n_paths = next_value(&mut args, "--paths")?,
            "--hot" => hot = next_value(&mut args, "--hot")?,
            "--flows" => flows = next_value(&mut args, "--flows")?,
            "--packets" => packets = next_value(&mut args, "--packets")?,
            "--duration-ms" => duration_ms = next_value(&mut args, "--duration-ms")?,
            "--fail-path" => fail_path = Some(next_value(&mut args, "--fail-path")?),
            "--fail-from-ms" => fail_from_ms = next_value(&mut args, "--fail-from-ms")?,
            "--fail-until-ms" => fail_until_ms = next_value(&mut args, "--fail-until-ms")?,
            "--metrics" => metrics = true,
            "-h" | "--help" => {
                println!("{}", usage());
                return Ok(());
            }
            other => anyhow::bail!("unknown argument: {other}\n{}", usage()),
        }
    }

    let engine_cfg = match &config_path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {path}"))?;
            TlbConfig::from_toml_str(&text).map_err(|e| anyhow::anyhow!("{path}: {e}"))?
        }
        None => TlbConfig::default(),
    };
    if n_paths == 0 {
        anyhow::bail!("--paths must be at least 1");
    }

    let duration = Duration::from_millis(duration_ms);
    let mut scenario = leaf_spine_scenario(seed, n_paths, hot.min(n_paths), duration);
    if let Some(path) = fail_path {
        if path >= n_paths {
            anyhow::bail!("--fail-path {path} is out of range for {n_paths} paths");
        }
        scenario.outages.push(Outage {
            path,
            from: Duration::from_millis(fail_from_ms),
            until: Duration::from_millis(fail_until_ms),
        });
    }
    let fabric_cfg = FabricConfig {
        flows,
        packets_per_flow: packets,
        ..FabricConfig::new(seed, scenario)
    };

    tracing::info!(
        seed,
        paths = n_paths,
        hot,
        flows,
        fail_path = ?fail_path,
        run_mode = engine_cfg.run_mode.as_str(),
        "starting simulation"
    );

    let mut fabric = Fabric::new(fabric_cfg, engine_cfg);
    let report = fabric.run();
    let prometheus = metrics.then(|| {
        let e = fabric.engine();
        tlb_core::metrics::render_prometheus(&e.stats(), &e.path_stats())
    });
    let json = serde_json::to_string_pretty(&report)?;

    match output {
        Some(path) => {
            std::fs::write(&path, &json).with_context(|| format!("failed to write {path}"))?;
            eprintln!("report written to {path}");
        }
        None => println!("{json}"),
    }
    if let Some(text) = prometheus {
        eprintln!("{text}");
    }
    Ok(())
}
