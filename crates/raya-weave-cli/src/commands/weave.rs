//! `raya-weave weave`: rewrite a tree of class units

use anyhow::Context;
use raya_weaver::{DirectoryProvider, MetricsConfig, TypeName, WeavingHook, UNIT_EXTENSION};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One unit to weave
#[derive(Debug, Clone)]
struct Input {
    path: PathBuf,
    relative: PathBuf,
    name: TypeName,
}

/// Totals printed after a run
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Summary {
    /// Units visited
    pub types_seen: usize,
    /// Units with at least one rewritten method
    pub types_woven: usize,
    /// Methods rewritten
    pub methods_woven: usize,
    /// Selected methods left unchanged
    pub methods_skipped: usize,
    /// Configuration diagnostics
    pub diagnostics: usize,
}

pub fn execute(
    config: PathBuf,
    classpath: Vec<PathBuf>,
    out: PathBuf,
    jobs: Option<usize>,
    units: Vec<PathBuf>,
) -> anyhow::Result<()> {
    let config = MetricsConfig::load(&config)
        .with_context(|| format!("failed to load configuration {}", config.display()))?;
    super::init_logging(config.global().debug);

    let summary = run(config, &classpath, &out, jobs, &units)?;
    println!(
        "Woven {} of {} types: {} methods woven, {} skipped, {} configuration diagnostics",
        summary.types_woven, summary.types_seen, summary.methods_woven, summary.methods_skipped, summary.diagnostics
    );
    Ok(())
}

/// Weave the selected units of `classpath` into `out`
pub fn run(
    config: MetricsConfig,
    classpath: &[PathBuf],
    out: &Path,
    jobs: Option<usize>,
    units: &[PathBuf],
) -> anyhow::Result<Summary> {
    let inputs = if units.is_empty() {
        collect_classpath(classpath)?
    } else {
        units.iter().map(|path| input_for(classpath, path)).collect()
    };

    let provider = Arc::new(DirectoryProvider::new(classpath.iter().cloned()));
    let hook = WeavingHook::open(Arc::new(config), provider).context("failed to open call-shape dump")?;
    let workers = jobs.unwrap_or_else(num_cpus::get).max(1).min(inputs.len().max(1));
    tracing::debug!(units = inputs.len(), workers, "weaving");

    let (work_tx, work_rx) = crossbeam::channel::unbounded::<Input>();
    let (done_tx, done_rx) = crossbeam::channel::unbounded::<anyhow::Result<Summary>>();
    for input in inputs {
        work_tx.send(input)?;
    }
    drop(work_tx);

    std::thread::scope(|s| {
        for _ in 0..workers {
            let work = work_rx.clone();
            let done = done_tx.clone();
            let hook = &hook;
            s.spawn(move || {
                for input in work.iter() {
                    if done.send(weave_unit(hook, out, &input)).is_err() {
                        break;
                    }
                }
            });
        }
    });
    drop(done_tx);

    let mut summary = Summary::default();
    for report in done_rx.iter() {
        let report = report?;
        summary.types_seen += report.types_seen;
        summary.types_woven += report.types_woven;
        summary.methods_woven += report.methods_woven;
        summary.methods_skipped += report.methods_skipped;
        summary.diagnostics += report.diagnostics;
    }
    Ok(summary)
}

fn weave_unit(hook: &WeavingHook, out: &Path, input: &Input) -> anyhow::Result<Summary> {
    let raw = std::fs::read(&input.path).with_context(|| format!("failed to read {}", input.path.display()))?;
    let result = hook.weave(&input.name, &raw);

    let target = out.join(&input.relative);
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(&target, &result.bytes).with_context(|| format!("failed to write {}", target.display()))?;

    Ok(Summary {
        types_seen: 1,
        types_woven: usize::from(result.woven),
        methods_woven: result.methods_woven(),
        methods_skipped: result.methods_skipped(),
        diagnostics: result.unused_rules.len(),
    })
}

/// Every unit below the classpath roots; the first root providing a path wins
fn collect_classpath(classpath: &[PathBuf]) -> anyhow::Result<Vec<Input>> {
    let mut inputs: Vec<Input> = Vec::new();
    for root in classpath {
        let pattern = root.join(format!("**/*.{}", UNIT_EXTENSION));
        let pattern = pattern
            .to_str()
            .with_context(|| format!("classpath entry is not valid UTF-8: {}", root.display()))?;
        for path in glob::glob(pattern)?.flatten() {
            let Ok(relative) = path.strip_prefix(root) else {
                continue;
            };
            if inputs.iter().any(|i| i.relative == relative) {
                continue;
            }
            inputs.push(Input {
                name: type_name_of(relative),
                relative: relative.to_path_buf(),
                path,
            });
        }
    }
    Ok(inputs)
}

fn input_for(classpath: &[PathBuf], path: &Path) -> Input {
    let relative = classpath
        .iter()
        .find_map(|root| path.strip_prefix(root).ok())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| path.file_name().map(PathBuf::from).unwrap_or_else(|| path.to_path_buf()));
    Input {
        name: type_name_of(&relative),
        relative,
        path: path.to_path_buf(),
    }
}

/// `org/example/Foo.rcls` → `org.example.Foo`
fn type_name_of(relative: &Path) -> TypeName {
    let stem = relative.with_extension("");
    let parts: Vec<String> = stem
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    TypeName::new(parts.join("."))
}
