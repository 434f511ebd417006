//! CLI command implementations

use anyhow::{Context as _, Result, anyhow, bail};
use chrono::DateTime;
use colored::Colorize;
use jirest_core::{
    Comment, Config, HttpTransport, Issue, IssueService, Node, SaveOutcome, Transition,
};
use serde_json::{Value, json};
use std::path::PathBuf;
use std::rc::Rc;
use tabled::settings::Style;
use tabled::{Table, Tabled};
use tracing::debug;

/// Settings given on the command line or through the environment
pub struct Overrides {
    pub config: Option<PathBuf>,
    pub url: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl Overrides {
    fn config_path(&self) -> Option<PathBuf> {
        self.config.clone().or_else(Config::default_path)
    }

    fn load_config(&self) -> Result<Config> {
        let mut config = match self.config_path() {
            Some(path) => Config::load(&path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => Config::default(),
        };

        if let Some(url) = &self.url {
            config.base_url = url.clone();
        }
        if let Some(user) = &self.user {
            config.username = Some(user.clone());
        }
        if let Some(password) = &self.password {
            config.password = Some(password.clone());
        }
        Ok(config)
    }
}

/// Configuration plus a service talking to the configured server
pub struct Context {
    config: Config,
    service: IssueService,
}

impl Context {
    pub fn new(overrides: &Overrides) -> Result<Self> {
        let config = overrides.load_config()?;
        if !config.display.colors {
            colored::control::set_override(false);
        }

        debug!(base_url = %config.base_url, "connecting");
        let transport = HttpTransport::from_config(&config);
        let service = IssueService::new(Rc::new(transport));
        Ok(Self { config, service })
    }

    fn load(&self, key: &str) -> Result<Issue> {
        self.service
            .load(key)?
            .ok_or_else(|| anyhow!("Issue not found: {}", key))
    }
}

/// Value at `path` as already known locally; never triggers a request
fn peek(issue: &Issue, path: &str) -> Option<String> {
    issue.with_body(|body| match body.get_path(path)? {
        Node::Scalar(Value::String(s)) => Some(s.clone()),
        Node::Scalar(Value::Null) => None,
        Node::Scalar(other) => Some(other.to_string()),
        _ => None,
    })
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max.saturating_sub(1)).collect();
    format!("{cut}…")
}

/// Reformat a Jira timestamp, leaving unparseable values untouched
fn format_timestamp(raw: &str, format: &str) -> String {
    DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z")
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|ts| ts.format(format).to_string())
        .unwrap_or_else(|_| raw.to_string())
}

/// Split `PATH=VALUE`; the value is taken as JSON if it parses, else as text
fn parse_assignment(raw: &str) -> Result<(String, Value)> {
    let (path, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("Expected PATH=VALUE, got: {}", raw))?;
    if path.is_empty() || path.split('.').any(str::is_empty) {
        bail!("Invalid field path: {}", path);
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((path.to_string(), value))
}

fn ensure_saved(outcome: SaveOutcome, what: &str) -> Result<SaveOutcome> {
    match outcome {
        SaveOutcome::Rejected(reason) => bail!("{} not saved: {}", what, reason),
        other => Ok(other),
    }
}

#[derive(Tabled)]
struct IssueRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Type")]
    issue_type: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Summary")]
    summary: String,
}

impl IssueRow {
    fn new(issue: &Issue, max_summary: usize) -> Self {
        Self {
            key: issue.identifier().unwrap_or_default(),
            issue_type: peek(issue, "fields.issuetype.name").unwrap_or_default(),
            status: peek(issue, "fields.status.name").unwrap_or_default(),
            summary: truncate(&peek(issue, "fields.summary").unwrap_or_default(), max_summary),
        }
    }
}

fn print_issue_table(issues: &[Issue], config: &Config) {
    let rows: Vec<IssueRow> = issues
        .iter()
        .map(|issue| IssueRow::new(issue, config.display.max_summary_length))
        .collect();
    println!("{}", Table::new(rows).with(Style::rounded()));
}

pub fn show(ctx: &Context, key: &str, field: Option<&str>, json: bool) -> Result<()> {
    let issue = ctx.load(key)?;

    if let Some(path) = field {
        let node = issue
            .get(path)
            .ok_or_else(|| anyhow!("Field not found: {}", path))?;
        match node.to_json() {
            Value::String(s) if !json => println!("{}", s),
            value => println!("{}", serde_json::to_string_pretty(&value)?),
        }
        return Ok(());
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&issue.to_json())?);
        return Ok(());
    }

    let display = &ctx.config.display;
    println!(
        "{} {}",
        issue.identifier().unwrap_or_default().cyan().bold(),
        issue.get_str("fields.summary").unwrap_or_default().bold()
    );
    println!();
    println!("Status:   {}", peek(&issue, "fields.status.name").unwrap_or_default());
    println!("Type:     {}", peek(&issue, "fields.issuetype.name").unwrap_or_default());
    println!("Priority: {}", peek(&issue, "fields.priority.name").unwrap_or_default());
    if let Some(assignee) = peek(&issue, "fields.assignee.displayName") {
        println!("Assignee: {}", assignee);
    }
    if let Some(created) = peek(&issue, "fields.created") {
        println!("Created:  {}", format_timestamp(&created, &display.date_format));
    }
    if let Some(updated) = peek(&issue, "fields.updated") {
        println!("Updated:  {}", format_timestamp(&updated, &display.date_format));
    }
    if let Some(parent) = issue.parent() {
        println!("Parent:   {}", parent.identifier().unwrap_or_default().cyan());
    }

    if let Some(description) = peek(&issue, "fields.description") {
        println!();
        println!("{}", "Description:".bold());
        println!("{}", description);
    }

    let subtasks = issue.sub_issues()?;
    if !subtasks.is_empty() {
        println!();
        println!("{}", "Sub-tasks:".bold());
        for subtask in &subtasks {
            println!(
                "  {} [{}] {}",
                subtask.identifier().unwrap_or_default().cyan(),
                peek(subtask, "fields.status.name").unwrap_or_default(),
                truncate(
                    &peek(subtask, "fields.summary").unwrap_or_default(),
                    display.max_summary_length
                )
            );
        }
    }

    Ok(())
}

pub fn create(
    ctx: &Context,
    summary: &str,
    project: Option<String>,
    issue_type: &str,
    description: Option<String>,
    parent: Option<String>,
    json: bool,
) -> Result<()> {
    let (issue, parent) = match parent {
        Some(parent_key) => {
            let parent = ctx.load(&parent_key)?;
            let child = parent
                .create_sub_issue()
                .ok_or_else(|| anyhow!("{} is a sub-task and cannot have sub-tasks", parent_key))?;
            (child, Some(parent))
        }
        None => (ctx.service.create(), None),
    };

    // a sub-task inherits its parent's project unless one is given
    match (&project, &parent) {
        (Some(project), _) => {
            issue.set("fields.project.key", project);
        }
        (None, Some(_)) => {}
        (None, None) => {
            let project = ctx
                .config
                .default_project
                .as_deref()
                .ok_or_else(|| anyhow!("No project given and no default_project configured"))?;
            issue.set("fields.project.key", project);
        }
    }

    issue.set("fields.summary", summary);
    issue.set("fields.issuetype.name", issue_type);
    if let Some(description) = description {
        issue.set("fields.description", description);
    }

    ensure_saved(issue.save()?, "Issue")?;

    if json {
        println!("{}", serde_json::to_string(&issue.to_json())?);
    } else {
        println!(
            "{} Created issue: {}",
            "✓".green(),
            issue.identifier().unwrap_or_default()
        );
        println!("  Summary: {}", summary);
        if let Some(parent) = parent {
            println!("  Parent:  {}", parent.identifier().unwrap_or_default());
        }
    }

    Ok(())
}

pub fn update(ctx: &Context, key: &str, assignments: &[String], json: bool) -> Result<()> {
    let assignments = assignments
        .iter()
        .map(|raw| parse_assignment(raw))
        .collect::<Result<Vec<_>>>()?;

    let issue = ctx.load(key)?;
    for (path, value) in assignments {
        if !issue.set(&path, value) {
            debug!(field = %path, "value unchanged or not assignable");
        }
    }

    let pending = Value::Object(issue.diff());
    let outcome = ensure_saved(issue.save()?, "Issue")?;

    if json {
        println!(
            "{}",
            serde_json::to_string(&json!({"key": key, "outcome": outcome.to_string(), "sent": pending}))?
        );
    } else if outcome == SaveOutcome::Unchanged {
        println!("{} Nothing to update on {}", "-".dimmed(), key);
    } else {
        println!("{} Updated {}", "✓".green(), key);
    }

    Ok(())
}

pub fn search(ctx: &Context, jql: &str, all: bool, limit: Option<u64>, json: bool) -> Result<()> {
    let mut search = ctx.service.search();
    search.set_fields(
        ["summary", "status", "issuetype", "priority", "assignee"]
            .iter()
            .map(|f| f.to_string())
            .collect(),
    );

    let page_size = match limit {
        Some(limit) if !all => limit.min(ctx.config.page_size),
        _ => ctx.config.page_size,
    };
    search.set_max_results(page_size);
    search.start(jql)?;

    let issues: Vec<Issue> = if all {
        search.load_all()?;
        search.issues().to_vec()
    } else {
        let limit = limit.unwrap_or(ctx.config.page_size) as usize;
        search.by_ref().take(limit).collect::<jirest_core::Result<_>>()?
    };

    if json {
        let values: Vec<Value> = issues.iter().map(Issue::to_json).collect();
        println!("{}", serde_json::to_string(&values)?);
    } else if issues.is_empty() {
        println!("No issues found");
    } else {
        print_issue_table(&issues, &ctx.config);
        if let Some(total) = search.total() {
            println!("{} of {} issues", issues.len(), total);
        }
    }

    Ok(())
}

pub fn comment(ctx: &Context, key: &str, text: &str, json: bool) -> Result<()> {
    let mut comment: Comment = ctx.service.comments().create(key);
    comment.set_body(text);
    ensure_saved(comment.save()?, "Comment")?;

    if json {
        println!(
            "{}",
            serde_json::to_string(&json!({"issue": key, "id": comment.id(), "body": comment.body()}))?
        );
    } else {
        println!(
            "{} Commented on {} (comment {})",
            "✓".green(),
            key,
            comment.id().unwrap_or_default()
        );
    }

    Ok(())
}

pub fn transitions(ctx: &Context, key: &str, json: bool) -> Result<()> {
    let issue = ctx.load(key)?;
    let response = Transition::available_raw(&issue)
        .ok_or_else(|| anyhow!("Could not fetch transitions for {}", key))?;
    let transitions = response
        .get("transitions")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    if json {
        println!("{}", serde_json::to_string(&transitions)?);
    } else if transitions.is_empty() {
        println!("No transitions available");
    } else {
        for transition in &transitions {
            let field = |path: &[&str]| {
                path.iter()
                    .try_fold(transition, |value, segment| value.get(segment))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            };
            println!(
                "{} {} → {}",
                field(&["id"]).cyan(),
                field(&["name"]),
                field(&["to", "name"]).bold()
            );
        }
    }

    Ok(())
}

pub fn transition(
    ctx: &Context,
    key: &str,
    id: &str,
    comment: Option<String>,
    json: bool,
) -> Result<()> {
    let issue = ctx.load(key)?;
    let mut transition = Transition::new(&issue, Some(id));
    if let Some(comment) = comment {
        transition.add_comment(&comment);
    }

    ensure_saved(transition.execute(), "Transition")?;
    let status = peek(&issue, "fields.status.name").unwrap_or_default();

    if json {
        println!(
            "{}",
            serde_json::to_string(&json!({"key": key, "transition": id, "status": status}))?
        );
    } else {
        println!("{} {} is now {}", "✓".green(), key, status.bold());
    }

    Ok(())
}

pub fn subtasks(ctx: &Context, key: &str, json: bool) -> Result<()> {
    let issue = ctx.load(key)?;
    let subtasks = issue.sub_issues()?;

    if json {
        let values: Vec<Value> = subtasks.iter().map(Issue::to_json).collect();
        println!("{}", serde_json::to_string(&values)?);
    } else if subtasks.is_empty() {
        println!("{} has no sub-tasks", key);
    } else {
        print_issue_table(&subtasks, &ctx.config);
    }

    Ok(())
}

/// Show current configuration
pub fn config_show(overrides: &Overrides, json: bool) -> Result<()> {
    let mut config = overrides.load_config()?;
    if config.password.is_some() {
        config.password = Some("***".to_string());
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        println!("{}", "Current configuration:".bold());
        println!();
        print!("{}", toml::to_string_pretty(&config)?);
    }

    Ok(())
}

/// Write the commented default configuration
pub fn config_init(overrides: &Overrides, force: bool) -> Result<()> {
    let path = overrides
        .config_path()
        .ok_or_else(|| anyhow!("No config directory on this system; pass --config"))?;

    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(&path, Config::default_with_comments())?;

    println!("{} Wrote {}", "✓".green(), path.display());
    Ok(())
}

/// Print the configuration file location
pub fn config_path(overrides: &Overrides) -> Result<()> {
    let path = overrides
        .config_path()
        .ok_or_else(|| anyhow!("No config directory on this system"))?;
    println!("{}", path.display());
    Ok(())
}
