//! Demo command - drive a cached framework against an in-memory store

use crate::cache::{CacheEvent, ListenerExt};
use crate::cli::args::{DemoArgs, OutputFormat};
use crate::config::Config;
use crate::error::{CanopyError, CanopyResult};
use crate::framework::ModeledFramework;
use crate::model::{JsonModelSerializer, ModelSpec, NodeName, ZPath};
use crate::store::MemoryStore;
use crate::ui::{self, UiContext};
use console::style;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Model stored by the demo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub name: String,
    pub count: u32,
}

impl Item {
    fn new(name: impl Into<String>, count: u32) -> Self {
        Self {
            name: name.into(),
            count,
        }
    }
}

impl NodeName for Item {
    fn node_name(&self) -> String {
        self.name.clone()
    }
}

/// One delivered event, flattened for printing
#[derive(Debug, Clone, Serialize)]
struct EventRecord {
    seq: usize,
    kind: &'static str,
    path: Option<String>,
    model: Option<Item>,
}

type Recorded = Arc<Mutex<Vec<EventRecord>>>;

/// Execute the demo command
pub async fn execute(args: DemoArgs, config: &Config) -> CanopyResult<()> {
    let ctx = UiContext::detect();
    let chatty = args.format == OutputFormat::Table;

    let store = Arc::new(MemoryStore::new());
    let root = ZPath::parse(&config.cache.root)?;
    let spec = ModelSpec::builder(root.clone(), JsonModelSerializer::<Item>::new())
        .with_config(&config.model)
        .build();
    let items = ModeledFramework::wrap(store.clone(), spec).cached();

    // Written before start; only visible as part of the initial snapshot
    store.server().set(&root, Vec::new())?;
    let seed = Item::new("seed", 0);
    items.child_for(&seed)?.set(&seed).await?;

    let recorded: Recorded = Arc::new(Mutex::new(Vec::new()));
    if config.cache.post_initialized_only {
        items
            .listenable()
            .add_listener(recorder(&recorded).post_initialized_only());
    } else {
        items.listenable().add_listener(recorder(&recorded));
    }

    items.start()?;
    items
        .await_initialized(config.cache.initialize_timeout())
        .await?;
    if chatty {
        ui::heading(&ctx, "Canopy demo");
        ui::key_value(&ctx, "root", &root.to_string());
        ui::step_ok(&ctx, &format!("Cache initialized ({})", items.phase()));
    }

    for i in 1..=args.children {
        let item = Item::new(format!("item-{}", i), i);
        items.child_for(&item)?.set(&item).await?;
    }
    let expected = args.children as usize + 1;
    settle("children to reach the cache", || items.cache().size() == expected).await?;
    if chatty {
        let children = items.children().await?;
        ui::step_ok(&ctx, &format!("{} children cached", children.len()));
    }

    let first = items.child("item-1")?;
    store.lose();
    let stale = first.read().await?;
    if chatty {
        ui::step_info(
            &ctx,
            &format!("Connection lost; item-1 still reads count={}", stale.count),
        );
    }

    let changed = Item::new("item-1", stale.count + 100);
    store
        .server()
        .set(first.path(), items.model_spec().encode(&changed)?)?;
    store.server().delete(&root.child(&seed.node_name())?)?;
    store.reconnect();
    settle("the reconnect resync", || {
        recorded.lock().iter().any(|r| r.kind == "reconnected")
    })
    .await?;

    let fresh = first.read().await?;
    debug!("item-1 after reconnect: {:?}", fresh);
    if chatty {
        ui::step_ok(
            &ctx,
            &format!("Reconnected; item-1 now reads count={}", fresh.count),
        );
    }

    items.close().await;
    print_events(&ctx, args.format, &recorded.lock())?;
    Ok(())
}

fn recorder(
    recorded: &Recorded,
) -> impl Fn(&CacheEvent<Item>) -> CanopyResult<()> + Send + Sync + 'static {
    let recorded = recorded.clone();
    move |event: &CacheEvent<Item>| -> CanopyResult<()> {
        let mut records = recorded.lock();
        let seq = records.len() + 1;
        records.push(EventRecord {
            seq,
            kind: event.kind().as_str(),
            path: event.node().map(|node| node.path.to_string()),
            model: event.model().cloned(),
        });
        Ok(())
    }
}

/// Poll until `condition` holds
async fn settle(what: &str, condition: impl Fn() -> bool) -> CanopyResult<()> {
    let wait = async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(SETTLE_TIMEOUT, wait)
        .await
        .map_err(|_| CanopyError::Timeout(what.to_string()))
}

fn print_events(ctx: &UiContext, format: OutputFormat, records: &[EventRecord]) -> CanopyResult<()> {
    match format {
        OutputFormat::Table => print_table(ctx, records),
        OutputFormat::Json => {
            for record in records {
                println!("{}", serde_json::to_string(record)?);
            }
        }
        OutputFormat::Plain => {
            for record in records {
                match &record.path {
                    Some(path) => println!("{} {}", record.kind, path),
                    None => println!("{}", record.kind),
                }
            }
        }
    }
    Ok(())
}

fn print_table(ctx: &UiContext, records: &[EventRecord]) {
    println!();
    ui::heading(ctx, "Events");
    println!(
        "{:<4} {:<12} {:<28} {:<10}",
        style("#").bold(),
        style("KIND").bold(),
        style("PATH").bold(),
        style("COUNT").bold()
    );
    println!("{}", "-".repeat(56));

    for record in records {
        let kind = match record.kind {
            "added" => style(record.kind).green(),
            "updated" => style(record.kind).cyan(),
            "removed" => style(record.kind).red(),
            _ => style(record.kind).yellow(),
        };
        let path = record.path.as_deref().unwrap_or("-");
        let count = record
            .model
            .as_ref()
            .map(|m| m.count.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{:<4} {:<12} {:<28} {:<10}", record.seq, kind, path, count);
    }

    println!();
    ui::remark(ctx, &format!("{} event(s)", records.len()));
}
