mod cli;
mod config;

use anyhow::{Context, Result};
use clap::Parser;
use log::{warn, LevelFilter};

use cli::{Cli, Command};
use config::{Overrides, Settings};
use utask::kv::{SqliteBucket, SqliteSubstrate};
use utask::output::{self, TaskDetail};
use utask::{StatusFilter, Store, StoreError, Task, TaskInput, UpdateSet};

type TaskStore = Store<SqliteBucket>;

fn setup_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_env("UTASK_LOG")
        .format_timestamp_secs()
        .init();
}

fn ensure_db_dir(db_path: &str) -> Result<()> {
    if let Some(parent) = std::path::Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
    }
    Ok(())
}

fn exit_code(e: &anyhow::Error) -> i32 {
    e.downcast_ref::<StoreError>().map_or(1, StoreError::exit_code)
}

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {e:#}");
        if let Some(StoreError::Ambiguous { candidates, .. }) = e.downcast_ref::<StoreError>() {
            eprintln!("candidates:");
            for id in candidates {
                eprintln!("  {id}");
            }
        }
        std::process::exit(exit_code(&e));
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let settings: Settings = config::load(
        cli.config.as_deref(),
        Overrides {
            db: cli.db,
            profile: cli.profile,
        },
    )?;
    ensure_db_dir(&settings.db_path)?;

    let substrate = SqliteSubstrate::open(&settings.db_path)
        .map_err(StoreError::SubstrateUnavailable)
        .with_context(|| format!("failed to open {}", settings.db_path))?;
    let store = Store::open(&substrate, &settings.profile)?.with_max_attempts(settings.max_cas_attempts);

    let result = dispatch(&store, cli.command);

    store.close();
    if let Err(e) = substrate.close() {
        warn!("failed to close database {}: {e}", settings.db_path);
    }
    result
}

fn parse_status(status: Option<&str>) -> Result<Option<StatusFilter>> {
    Ok(status.map(str::parse).transpose()?)
}

/// Replacement tag set from `--tag` and `--tags`. Blank items are ignored;
/// `None` when nothing remains.
fn replacement_tags(tag: Vec<String>, tags: Vec<String>) -> Option<Vec<String>> {
    let tags: Vec<String> = tag
        .into_iter()
        .chain(tags)
        .filter(|t| !t.trim().is_empty())
        .collect();
    (!tags.is_empty()).then_some(tags)
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_tasks(tasks: &[Task], json: bool) -> Result<()> {
    if json {
        let details: Vec<TaskDetail> = tasks.iter().map(TaskDetail::new).collect();
        print_json(&details)
    } else {
        print!("{}", output::format_task_list(tasks));
        Ok(())
    }
}

fn dispatch(store: &TaskStore, command: Command) -> Result<()> {
    match command {
        Command::Create {
            title,
            tags,
            priority,
            estimate_minutes,
            json,
        } => {
            let input = TaskInput {
                priority,
                estimate_minutes,
                ..TaskInput::new(title).tags(tags)
            };
            let (task, existed) = store.create(&input)?;
            if json {
                print_json(&TaskDetail::new(&task))?;
            } else if existed {
                println!("{} (exists)", task.id);
            } else {
                println!("{}", task.id);
            }
        }

        Command::List {
            tag,
            tags,
            all_tags,
            status,
            limit,
            json,
        } => {
            let status = parse_status(status.as_deref())?;
            let tasks = if tags.is_empty() && all_tags.is_empty() {
                store.list(tag.as_deref(), status)?
            } else {
                let mut any: Vec<&str> = tags.iter().map(String::as_str).collect();
                any.extend(tag.as_deref());
                let all: Vec<&str> = all_tags.iter().map(String::as_str).collect();
                let mut tasks = store.query(&any, &all, limit)?;
                if let Some(status) = status {
                    tasks.retain(|t| status.matches(t));
                }
                tasks
            };
            print_tasks(&tasks, json)?;
        }

        Command::Get { id } => {
            let id = store.resolve(&id)?;
            let (task, _) = store.get(&id)?;
            print_json(&TaskDetail::new(&task))?;
        }

        Command::Show { id } => {
            let id = store.resolve(&id)?;
            let (task, _) = store.get(&id)?;
            print!("{}", output::format_task_detail(&task));
        }

        Command::Update {
            id,
            text,
            tag,
            tags,
            done,
            priority,
            estimate_minutes,
            json,
        } => {
            let set = UpdateSet {
                text,
                done,
                tags: replacement_tags(tag, tags),
                priority,
                estimate_minutes,
            };
            if set.is_empty() {
                return Err(StoreError::InvalidInput("nothing to update".into()).into());
            }
            let id = store.resolve(&id)?;
            let task = store.update(&id, &set)?;
            if json {
                print_json(&TaskDetail::new(&task))?;
            } else {
                println!("{} updated", task.id);
            }
        }

        Command::Close { id } => {
            let id = store.resolve(&id)?;
            let (task, changed) = store.close_task(&id)?;
            if changed {
                println!("{} closed", task.id);
            } else {
                println!("{} already closed", task.id);
            }
        }

        Command::Reopen { id } => {
            let id = store.resolve(&id)?;
            let (task, changed) = store.reopen_task(&id)?;
            if changed {
                println!("{} reopened", task.id);
            } else {
                println!("{} already open", task.id);
            }
        }

        Command::Delete { id } => {
            let id = store.resolve(&id)?;
            let id = store.delete(&id)?;
            println!("{id} deleted");
        }

        Command::Tags => {
            print!("{}", output::format_tag_counts(&store.list_tags()?));
        }

        Command::RebuildIndex => {
            let summary = store.rebuild_index()?;
            println!("OK");
            eprintln!(
                "Rebuilt tag index for '{}': {} tasks, {} tags, {} stale tags removed",
                store.namespace(),
                summary.tasks,
                summary.tags,
                summary.removed
            );
        }

        Command::Check { tag, status } => {
            let status = parse_status(status.as_deref())?;
            let tasks = store.list(tag.as_deref(), status)?;
            match output::format_trailer_issues(&tasks) {
                Some(report) => print!("{report}"),
                None => println!("OK"),
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_replacement_tags_are_ignored() {
        assert_eq!(replacement_tags(vec![], vec!["".into()]), None);
        assert_eq!(replacement_tags(vec!["  ".into()], vec![]), None);
        assert_eq!(
            replacement_tags(vec!["a".into()], vec!["".into(), "b".into()]),
            Some(vec!["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn update_accepts_title_alias() {
        let cli = Cli::try_parse_from(["ut", "update", "abc", "--title", "New text", "--tags", ""])
            .unwrap();
        match cli.command {
            Command::Update { id, text, tag, tags, .. } => {
                assert_eq!(id, "abc");
                assert_eq!(text.as_deref(), Some("New text"));
                assert_eq!(replacement_tags(tag, tags), None);
            }
            _ => panic!("expected update"),
        }
    }
}
