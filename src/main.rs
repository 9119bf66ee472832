use anyhow::{bail, Context};
use clap::Parser;
use lcsc_grabber::cli::{CacheCommand, CategoryCommand, Command, ImportArgs, ModelCommand};
use lcsc_grabber::kicad::lib_table::find_kicad_config_dir;
use lcsc_grabber::*;
use std::process;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let args = Cli::parse();

    // Initialize logger with custom format to hide module paths
    let level = if args.debug { log::LevelFilter::Debug } else { log::LevelFilter::Info };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "[{} {} lcsc-grabber] {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                record.level(),
                record.args()
            )
        })
        .init();

    if let Err(e) = run(args).await {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn run(args: Cli) -> anyhow::Result<()> {
    let mut settings = Settings::load(args.config.as_deref()).context("Failed to load settings")?;
    if let Some(library) = args.library {
        settings.library_root = library;
    }
    if let Some(cache_dir) = args.cache_dir {
        settings.cache_dir = cache_dir;
    }
    if let Some(format) = args.format {
        settings.format = format;
    }
    log::debug!("Settings: {:?}", settings);

    match args.command {
        Command::Import(import) => run_import(&settings, import).await,
        Command::Cache { action } => run_cache(&settings, action),
        Command::Model { action } => run_model(&settings, action).await,
        Command::Move { lcsc_id, from, to } => run_move(&settings, &lcsc_id, &from, &to).await,
        command => run_library(&open_library(&settings)?, command),
    }
}

fn open_library(settings: &Settings) -> anyhow::Result<LibraryManager> {
    let library = LibraryManager::open(&settings.library_root, settings.format)
        .with_context(|| format!("Failed to open library {}", settings.library_root.display()))?;
    Ok(library.with_model_paths(settings.model_paths))
}

fn open_cache(settings: &Settings) -> anyhow::Result<CacheStore> {
    CacheStore::with_retention(&settings.cache_dir, settings.retention())
        .with_context(|| format!("Failed to open cache {}", settings.cache_dir.display()))
}

fn build_importer(settings: &Settings) -> anyhow::Result<Importer<EasyedaApi>> {
    let api = EasyedaApi::with_options(ApiOptions {
        min_request_interval: settings.request_interval(),
        ..ApiOptions::default()
    })?;
    Ok(Importer::new(
        Arc::new(api),
        Arc::new(open_cache(settings)?),
        Arc::new(open_library(settings)?),
    ))
}

/// A token that Ctrl-C cancels.
fn interrupt_token() -> CancelToken {
    let cancel = CancelToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, cancelling imports");
            token.cancel();
        }
    });
    cancel
}

fn print_report(report: &ImportReport) {
    println!("✓ {} -> '{}': {}", report.lcsc_id, report.category, report.outcome);
    if let Some(outcome) = report.symbol {
        println!("  symbol:    {}", outcome);
    }
    if let Some(outcome) = report.footprint {
        println!("  footprint: {}", outcome);
    }
    for outcome in &report.models {
        println!("  3D model:  {}", outcome);
    }
    if !report.missing.is_empty() {
        println!("  missing:   {}", report.missing.join(", "));
    }
}

async fn run_import(settings: &Settings, args: ImportArgs) -> anyhow::Result<()> {
    args.validate()?;

    let lcsc_ids = args.get_lcsc_ids()?;
    let total_count = lcsc_ids.len();
    let category = args.category.clone().unwrap_or_else(|| settings.default_category.clone());
    let requests: Vec<ImportRequest> = lcsc_ids.iter()
        .map(|id| ImportRequest {
            parts: args.parts(),
            allow_partial: args.allow_partial,
            refresh: args.refresh,
            transform: args.transform(),
            ..ImportRequest::new(id.as_str(), category.as_str())
        })
        .collect();

    let importer = build_importer(settings)?;
    for id in &lcsc_ids {
        importer.cache().add_search_history(id)?;
    }
    let cancel = interrupt_token();

    if total_count == 1 {
        log::info!("Starting import for LCSC ID: {}", requests[0].lcsc_id);
        let report = importer.import(&requests[0], &cancel).await?;
        print_report(&report);
        println!("Library: {}", importer.library().root().display());
        return Ok(());
    }

    let parallel = args.parallel.unwrap_or(settings.parallel);
    log::info!("Batch mode: processing {} components", total_count);
    if parallel > 1 {
        log::info!("Parallel imports: {}", parallel);
    }

    let results = importer.import_batch(requests, parallel, args.continue_on_error, &cancel).await;
    let mut failed_list = Vec::new();
    for (index, (id, result)) in results.iter().enumerate() {
        match result {
            Ok(report) => print_report(report),
            Err(e) => {
                eprintln!("✗ [{}/{}] Failed: {} - {}", index + 1, total_count, id, e);
                failed_list.push(id.clone());
            }
        }
    }

    println!("\n{}", "=".repeat(60));
    println!("Batch import complete!");
    println!("Total: {} | Success: {} | Failed: {}", total_count, total_count - failed_list.len(), failed_list.len());
    if !failed_list.is_empty() {
        println!("\nFailed components:");
        for id in &failed_list {
            println!("  - {}", id);
        }
    }
    println!("Library: {}", importer.library().root().display());
    println!("{}", "=".repeat(60));

    if !failed_list.is_empty() && !args.continue_on_error {
        bail!("{} of {} imports failed", failed_list.len(), total_count);
    }
    Ok(())
}

fn run_library(library: &LibraryManager, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Remove { lcsc_id, category } => {
            let lcsc_id = easyeda::normalize_lcsc_id(&lcsc_id)?;
            for entry in library.remove_component(&lcsc_id, category.as_deref())? {
                println!("✓ Removed {} from '{}'", entry.lcsc_id, entry.category);
            }
        }
        Command::List { category } => {
            let entries = library.list(category.as_deref())?;
            for entry in &entries {
                println!(
                    "{:<10} {:<12} {:<40} {}",
                    entry.lcsc_id,
                    entry.category,
                    entry.name,
                    entry.updated_at.format("%Y-%m-%d %H:%M")
                );
            }
            println!("{} component(s)", entries.len());
        }
        Command::Category { action } => match action {
            CategoryCommand::Add { name } => {
                let category = library.ensure_category(&name)?;
                println!("✓ Category '{}' ready", category.id);
            }
            CategoryCommand::Remove { name } => {
                let moved = library.remove_category(&name)?;
                println!("✓ Removed category '{}' ({} component(s) moved to '{}')", name, moved.len(), DEFAULT_CATEGORY);
            }
            CategoryCommand::List => {
                for category in library.categories()? {
                    let count = library.list(Some(&category.id))?.len();
                    println!("{:<20} {:<20} {} component(s)", category.id, category.name, count);
                }
            }
        },
        Command::Reconcile => {
            let removed = library.reconcile()?;
            for entry in &removed {
                println!("Removed stale entry {} in '{}'", entry.lcsc_id, entry.category);
            }
            println!("✓ Manifest reconciled ({} stale entries)", removed.len());
        }
        Command::Register { kicad_config } => {
            let config_dir = match kicad_config {
                Some(dir) => dir,
                None => directories::BaseDirs::new()
                    .and_then(|base| find_kicad_config_dir(base.preference_dir()))
                    .context("Cannot locate the KiCad config directory, pass --kicad-config")?,
            };
            let registration = library.register_with_kicad(&config_dir)?;
            println!(
                "✓ Registered {} symbol and {} footprint libraries in {}",
                registration.symbol_libs.len(),
                registration.footprint_libs.len(),
                config_dir.display()
            );
            if registration.path_variable_set {
                println!("  {} -> {}", library::MODEL_PATH_VAR, library.store().models_dir().display());
            }
        }
        Command::Import(_) | Command::Cache { .. } | Command::Model { .. } | Command::Move { .. } => {
            unreachable!("handled before opening the library")
        }
    }
    Ok(())
}

async fn run_move(settings: &Settings, lcsc_id: &str, from: &str, to: &str) -> anyhow::Result<()> {
    let importer = build_importer(settings)?;
    let library = importer.library();
    let lcsc_id = easyeda::normalize_lcsc_id(lcsc_id)?;

    // Across KiCad revisions the entries are converted again from catalog data.
    let outcome = if library.same_revision(from, to)? {
        library.move_component(&lcsc_id, from, to)?
    } else {
        let (component, _) = importer.component(&lcsc_id, false, &interrupt_token()).await?;
        library.move_converted(&component, from, to)?
    };
    println!("✓ Moved {} from '{}' to '{}' ({})", lcsc_id, from, to, outcome);
    Ok(())
}

fn run_cache(settings: &Settings, action: CacheCommand) -> anyhow::Result<()> {
    let cache = open_cache(settings)?;
    match action {
        CacheCommand::Stats => {
            let stats = cache.stats()?;
            println!("Cache: {}", cache.dir().display());
            println!("Entries: {} ({} expired)", stats.total, stats.expired);
            println!("Size: {:.1} KiB", stats.bytes_on_disk as f64 / 1024.0);
            let recent = cache.search_history(10)?;
            if !recent.is_empty() {
                println!("Recent imports:");
                for (query, at) in recent {
                    println!("  {:<12} {}", query, at.format("%Y-%m-%d %H:%M"));
                }
            }
        }
        CacheCommand::Clear => println!("✓ Removed {} cache entries", cache.clear_all()?),
        CacheCommand::ClearExpired => println!("✓ Removed {} expired cache entries", cache.clear_expired()?),
    }
    Ok(())
}

async fn run_model(settings: &Settings, action: ModelCommand) -> anyhow::Result<()> {
    let importer = build_importer(settings)?;
    let cancel = interrupt_token();
    let library = importer.library();

    match action {
        ModelCommand::Set { lcsc_id, offset, rotation, scale } => {
            let (component, _) = importer.component(&lcsc_id, false, &cancel).await?;
            let (current, _) = library.effective_transform(&component)?;
            let transform = ModelTransform {
                offset: offset.unwrap_or(current.offset),
                rotation: rotation.unwrap_or(current.rotation),
                scale: scale.unwrap_or(current.scale),
            };
            let changed = library.update_model_transform(&component, transform)?;
            println!("✓ Placement for {} updated in {} categor(ies)", component.lcsc_id, changed.len());
        }
        ModelCommand::Reset { lcsc_id } => {
            let (component, _) = importer.component(&lcsc_id, false, &cancel).await?;
            let changed = library.reset_auto(&component)?;
            println!("✓ Placement for {} reset in {} categor(ies)", component.lcsc_id, changed.len());
        }
        ModelCommand::Show { lcsc_id } => {
            let (component, _) = importer.component(&lcsc_id, false, &cancel).await?;
            let (transform, overridden) = library.effective_transform(&component)?;
            println!("{} ({})", component.lcsc_id, if overridden { "override" } else { "automatic" });
            println!("  offset:   {:?}", transform.offset);
            println!("  rotation: {:?}", transform.rotation);
            println!("  scale:    {:?}", transform.scale);
        }
    }
    Ok(())
}
