use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::Task;
use crate::trailer::Trailer;

/// JSON view of a task with the title, body and trailers split out.
#[derive(Serialize)]
pub struct TaskDetail<'a> {
    #[serde(flatten)]
    pub task: &'a Task,
    pub short: &'a str,
    pub details: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub trailers: Vec<Trailer>,
}

impl<'a> TaskDetail<'a> {
    pub fn new(task: &'a Task) -> Self {
        Self {
            task,
            short: task.short(),
            details: task.details(),
            trailers: task.trailers(),
        }
    }
}

pub fn format_task_detail(task: &Task) -> String {
    let mut out = String::new();
    out.push_str(&format!("Id:       {}\n", task.id));
    out.push_str(&format!("Title:    {}\n", task.short()));
    out.push_str(&format!("Status:   {}\n", task.status()));
    if !task.tags.is_empty() {
        out.push_str(&format!("Tags:     {}\n", task.tags.join(", ")));
    }
    if task.priority != 0 {
        out.push_str(&format!("Priority: {}\n", task.priority));
    }
    if task.estimate_minutes != 0 {
        out.push_str(&format!("Estimate: {}m\n", task.estimate_minutes));
    }
    out.push_str(&format!("Created:  {}\n", task.created));

    let details = task.details();
    if !details.is_empty() {
        out.push('\n');
        for line in details.lines() {
            out.push_str(&format!("  {line}\n"));
        }
    }

    let trailers = task.trailers();
    if !trailers.is_empty() {
        out.push('\n');
        for t in &trailers {
            out.push_str(&format!("  {}: {}\n", t.key, t.value));
        }
    }
    out
}

/// One header line (`id  status  created  [tags]`) and the title per task.
pub fn format_task_list(tasks: &[Task]) -> String {
    let mut out = String::new();
    for task in tasks {
        out.push_str(&format!(
            "{}\t{}\t{}\t[{}]\n",
            task.id,
            task.status(),
            task.created,
            task.tags.join(",")
        ));
        out.push_str(&format!("   {}\n", task.short()));
    }
    out
}

pub fn format_tag_counts(counts: &BTreeMap<String, usize>) -> String {
    let mut out = String::new();
    for (tag, n) in counts {
        out.push_str(&format!("{tag}\t{n}\n"));
    }
    out
}

/// Report of tasks whose trailer block contains malformed lines. `None` when
/// every task is clean.
pub fn format_trailer_issues(tasks: &[Task]) -> Option<String> {
    let mut out = String::new();
    for task in tasks {
        let drops = task.trailer_drops();
        if drops.is_empty() {
            continue;
        }
        out.push_str(&format!("{}\t{}\n", task.id, task.short()));
        out.push_str("  Dropped lines from trailer block:\n");
        for line in drops {
            out.push_str(&format!("   - {line}\n"));
        }
    }
    (!out.is_empty()).then_some(out)
}
