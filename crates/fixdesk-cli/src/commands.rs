//! CLI command implementations

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use colored::{ColoredString, Colorize};
use fixdesk_core::{
    Config, Issue, IssueId, Location, NewIssue, Profile, Status, StorageBackend, Tracker,
    Transition, Workspace,
};
use std::fmt::Write as _;
use tabled::settings::Style;
use tabled::{Table, Tabled};

#[derive(Tabled)]
struct IssueRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Priority")]
    priority: String,
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "Reporter")]
    reporter: String,
    #[tabled(rename = "Location")]
    location: String,
    #[tabled(rename = "Reported")]
    created: String,
    #[tabled(rename = "Description")]
    description: String,
}

#[derive(Tabled)]
struct ProfileRow {
    #[tabled(rename = "Username")]
    username: String,
    #[tabled(rename = "Role")]
    role: String,
    #[tabled(rename = "Location")]
    location: String,
}

const MAX_DESCRIPTION: usize = 48;

/// Open the workspace and its tracker, applying display settings
fn open() -> Result<(Config, Tracker)> {
    let workspace = Workspace::find()?;
    let config = workspace.config()?;
    if !config.display.colors {
        colored::control::set_override(false);
    }
    let tracker = Tracker::open(&workspace).context("failed to open issue store")?;
    Ok((config, tracker))
}

fn parse_id(id: &str) -> Result<IssueId> {
    Ok(id.parse()?)
}

fn require_user(user: Option<&str>, action: &str) -> Result<String> {
    match user {
        Some(user) => Ok(user.to_string()),
        None => bail!("{} needs a user: pass --as <user> or set FIXDESK_USER", action),
    }
}

/// Fetch an issue as the --as user; without one the local operator sees
/// everything
fn fetch(tracker: &Tracker, user: Option<&str>, id: IssueId) -> Result<Issue> {
    let issue = match user {
        Some(_) => tracker.get_as(id, user)?,
        None => tracker.get(id)?,
    };
    Ok(issue)
}

fn format_time(at: &DateTime<Utc>, format: &str) -> String {
    let mut out = String::new();
    if write!(out, "{}", at.format(format)).is_err() {
        return at.to_rfc3339();
    }
    out
}

fn status_label(status: Status) -> ColoredString {
    match status {
        Status::Reported => status.as_str().white(),
        Status::Assigned => status.as_str().blue(),
        Status::InProgress => status.as_str().yellow(),
        Status::Resolved => status.as_str().green(),
        Status::Closed => status.as_str().dimmed(),
        Status::Duplicate => status.as_str().magenta(),
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let head: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

fn issue_rows(issues: &[Issue], date_format: &str) -> Vec<IssueRow> {
    issues
        .iter()
        .map(|issue| IssueRow {
            id: issue.id.to_string(),
            status: issue.status.to_string(),
            priority: issue.priority.clone(),
            category: issue.category.clone(),
            reporter: issue.reporter.clone(),
            location: issue.location.to_string(),
            created: format_time(&issue.created_at, date_format),
            description: truncate(&issue.description, MAX_DESCRIPTION),
        })
        .collect()
}

pub fn init(storage: &str) -> Result<()> {
    let storage: StorageBackend = storage.parse()?;
    let root = std::env::current_dir()?;
    let workspace = Workspace::init(&root, storage)?;
    println!(
        "{} Initialized fixdesk in {}",
        "✓".green(),
        workspace.dir().display()
    );
    println!("  Storage: {}", storage);
    println!(
        "  Management account: {}",
        fixdesk_core::workspace::DEFAULT_ADMIN
    );
    Ok(())
}

pub fn profile_add(
    username: &str,
    role: &str,
    hostel: Option<String>,
    block: Option<String>,
    room: Option<String>,
    json: bool,
) -> Result<()> {
    let workspace = Workspace::find()?;
    let book = workspace.profiles()?;
    let profile = Profile {
        username: username.to_string(),
        role: role.parse()?,
        location: Location { hostel, block, room },
    };
    book.upsert(profile.clone())?;

    if json {
        println!("{}", serde_json::to_string(&profile)?);
    } else {
        println!(
            "{} Saved profile {} ({})",
            "✓".green(),
            profile.username.cyan(),
            profile.role
        );
        println!("  Location: {}", profile.location);
    }
    Ok(())
}

pub fn profile_list(json: bool) -> Result<()> {
    let workspace = Workspace::find()?;
    let profiles = workspace.profiles()?.list()?;

    if json {
        println!("{}", serde_json::to_string(&profiles)?);
    } else if profiles.is_empty() {
        println!("No profiles found");
    } else {
        let rows: Vec<ProfileRow> = profiles
            .iter()
            .map(|p| ProfileRow {
                username: p.username.clone(),
                role: p.role.to_string(),
                location: p.location.to_string(),
            })
            .collect();
        println!("{}", Table::new(rows).with(Style::rounded()));
    }
    Ok(())
}

pub fn report(
    user: Option<&str>,
    description: &str,
    category: &str,
    priority: &str,
    visibility: Option<String>,
    image: Option<String>,
    json: bool,
) -> Result<()> {
    let reporter = require_user(user, "report")?;
    let (_, tracker) = open()?;

    let issue = tracker.report(NewIssue {
        reporter,
        category: category.to_string(),
        priority: priority.to_string(),
        description: description.to_string(),
        visibility: visibility.map(|v| v.parse()).transpose()?,
        image_path: image,
    })?;
    tracker.close()?;

    if json {
        println!("{}", serde_json::to_string(&issue)?);
    } else {
        println!("{} Reported issue {}", "✓".green(), issue.id.to_string().cyan());
        println!("  Category:   {}", issue.category);
        println!("  Priority:   {}", issue.priority);
        println!("  Visibility: {}", issue.visibility);
        println!("  Location:   {}", issue.location);
    }
    Ok(())
}

pub fn list(user: Option<&str>, status: Option<String>, mine: bool, json: bool) -> Result<()> {
    let (config, tracker) = open()?;

    let mut issues = match user {
        Some(user) if mine => tracker.reported_by(user)?,
        Some(user) => {
            let viewer = tracker.viewer(user)?;
            tracker.visible_for(&viewer)?
        }
        None if mine => bail!("--mine needs --as <user>"),
        // local operator without an identity sees everything
        None => tracker.all_issues()?,
    };

    if let Some(ref s) = status {
        let status: Status = s.parse()?;
        issues.retain(|i| i.status == status);
    }

    if json {
        println!("{}", serde_json::to_string(&issues)?);
    } else if issues.is_empty() {
        println!("No issues found");
    } else {
        let table = Table::new(issue_rows(&issues, &config.display.date_format))
            .with(Style::rounded())
            .to_string();
        println!("{}", table);
        println!("{} issue(s)", issues.len());
    }
    Ok(())
}

pub fn show(user: Option<&str>, id: &str, json: bool) -> Result<()> {
    let (config, tracker) = open()?;
    let issue = fetch(&tracker, user, parse_id(id)?)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&issue)?);
        return Ok(());
    }

    let fmt = &config.display.date_format;
    println!(
        "{} {}",
        issue.id.to_string().cyan().bold(),
        issue.category.bold()
    );
    println!();
    println!("Status:     {}", status_label(issue.status));
    println!("Priority:   {}", issue.priority);
    println!("Reporter:   {}", issue.reporter);
    println!("Location:   {}", issue.location);
    println!("Visibility: {}", issue.visibility);
    if let Some(ref assignee) = issue.assignee {
        println!("Assignee:   {}", assignee);
    }
    println!("Created:    {}", format_time(&issue.created_at, fmt));
    println!("Updated:    {}", format_time(&issue.updated_at, fmt));

    for status in &Status::FLOW[1..] {
        if let Some(at) = issue.reached_at(*status) {
            println!("{:<11} {}", format!("{}:", status), format_time(&at, fmt));
        }
    }

    if let Some(parent) = issue.parent_id {
        println!("Duplicate of: {}", parent.to_string().cyan());
    }
    if let Some(ref image) = issue.image_path {
        println!("Image:      {}", image);
    }

    println!();
    println!("{}", "Description:".bold());
    println!("{}", issue.description);

    if let Some(ref remarks) = issue.remarks {
        println!();
        println!("{}", "Remarks:".bold());
        println!("{}", remarks);
    }

    let duplicates = tracker.duplicate_issues(issue.id)?;
    if !duplicates.is_empty() {
        println!();
        println!("{}", "Duplicates:".bold());
        for dup in duplicates {
            println!("  {} reported by {}", dup.id, dup.reporter);
        }
    }

    Ok(())
}

pub fn status(
    user: Option<&str>,
    id: &str,
    status: &str,
    assign: Option<String>,
    json: bool,
) -> Result<()> {
    let (_, tracker) = open()?;
    let mut transition = Transition::to(status.parse()?);
    if let Some(who) = assign {
        transition = transition.assign(who);
    }

    let issue = tracker.transition(parse_id(id)?, transition, user)?;
    tracker.close()?;

    if json {
        println!("{}", serde_json::to_string(&issue)?);
    } else {
        println!(
            "{} {} is now {}",
            "✓".green(),
            issue.id.to_string().cyan(),
            status_label(issue.status)
        );
        if let Some(ref assignee) = issue.assignee {
            println!("  Assignee: {}", assignee);
        }
    }
    Ok(())
}

/// Assign and move to `Assigned` in one step
pub fn assign(user: Option<&str>, id: &str, who: &str, json: bool) -> Result<()> {
    status(user, id, Status::Assigned.as_str(), Some(who.to_string()), json)
}

pub fn merge(user: Option<&str>, parent: &str, child: &str, json: bool) -> Result<()> {
    let (_, tracker) = open()?;
    let parent = parse_id(parent)?;
    let merged = tracker.merge(parent, parse_id(child)?, user)?;
    tracker.close()?;

    if json {
        println!("{}", serde_json::to_string(&merged)?);
    } else {
        println!(
            "{} Merged {} into {}",
            "✓".green(),
            merged.id.to_string().cyan(),
            parent.to_string().cyan()
        );
    }
    Ok(())
}

pub fn duplicates(user: Option<&str>, id: &str, json: bool) -> Result<()> {
    let (_, tracker) = open()?;
    let id = fetch(&tracker, user, parse_id(id)?)?.id;
    let reporters = tracker.duplicates_of(id)?;

    if json {
        println!("{}", serde_json::to_string(&reporters)?);
    } else if reporters.is_empty() {
        println!("No duplicates of {}", id);
    } else {
        println!("{}", format!("Also reported by ({}):", reporters.len()).bold());
        for reporter in reporters {
            println!("  {}", reporter);
        }
    }
    Ok(())
}

pub fn history(user: Option<&str>, id: &str, json: bool) -> Result<()> {
    let (config, tracker) = open()?;
    let id = fetch(&tracker, user, parse_id(id)?)?.id;
    let changes = tracker.history(id)?;

    if json {
        println!("{}", serde_json::to_string(&changes)?);
    } else if changes.is_empty() {
        println!("No status changes recorded for {}", id);
    } else {
        for change in changes {
            println!(
                "{}  {} -> {}  {}",
                format_time(&change.changed_at, &config.display.date_format).dimmed(),
                status_label(change.old_status),
                status_label(change.new_status),
                change.changed_by.as_deref().unwrap_or("-")
            );
        }
    }
    Ok(())
}

pub fn check(json: bool) -> Result<()> {
    let (_, tracker) = open()?;
    let report = tracker.check_links()?;

    if json {
        println!("{}", serde_json::to_string(&report)?);
        return Ok(());
    }

    for cycle in &report.cycles {
        let ids: Vec<String> = cycle.iter().map(ToString::to_string).collect();
        println!("{} Merge cycle: {}", "✗".red(), ids.join(" -> "));
    }
    for (child, parent) in &report.dangling {
        println!("{} {} points at missing parent {}", "✗".red(), child, parent);
    }
    for id in &report.reopened_duplicates {
        println!(
            "{} {} has a parent but is no longer marked Duplicate",
            "!".yellow(),
            id
        );
    }

    if report.is_clean() {
        println!("{} Parent links are consistent", "✓".green());
        Ok(())
    } else {
        bail!("link check found problems")
    }
}

/// Show current configuration
pub fn config_show(json: bool) -> Result<()> {
    let workspace = Workspace::find()?;
    let config = workspace.config()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        println!("{}", "Current configuration:".bold());
        println!();
        println!("storage = \"{}\"", config.storage);
        println!("policy = \"{}\"", config.policy);
        println!("default_visibility = \"{}\"", config.default_visibility);
        println!();
        println!("[display]");
        println!("colors = {}", config.display.colors);
        println!("date_format = \"{}\"", config.display.date_format);
        println!();
        println!("[api]");
        println!("host = \"{}\"", config.api.host);
        println!("port = {}", config.api.port);
    }

    Ok(())
}

/// Reset configuration to defaults
pub fn config_reset() -> Result<()> {
    let workspace = Workspace::find()?;
    std::fs::write(workspace.config_path(), Config::default_with_comments())?;

    println!("{} Configuration reset to defaults", "✓".green());
    Ok(())
}

/// Get a specific config value
/// Dotted config key ("display.colors") as a JSON pointer
fn config_pointer(key: &str) -> String {
    format!("/{}", key.replace('.', "/"))
}

fn config_value<'a>(config: &'a serde_json::Value, key: &str) -> Result<&'a serde_json::Value> {
    config
        .pointer(&config_pointer(key))
        .ok_or_else(|| anyhow::anyhow!("Unknown config key: {}", key))
}

/// Set one key, parsing `raw` as the type the key already holds. The result
/// must still load as a config.
fn with_config_value(config: &Config, key: &str, raw: &str) -> Result<Config> {
    use serde_json::Value;

    let mut doc = serde_json::to_value(config)?;
    let slot = doc
        .pointer_mut(&config_pointer(key))
        .ok_or_else(|| anyhow::anyhow!("Unknown config key: {}", key))?;
    let value = match slot {
        Value::Bool(_) => Value::Bool(
            raw.parse()
                .map_err(|_| anyhow::anyhow!("Invalid boolean value: {}", raw))?,
        ),
        Value::Number(_) => Value::from(
            raw.parse::<u64>()
                .map_err(|_| anyhow::anyhow!("Invalid number: {}", raw))?,
        ),
        Value::Object(_) | Value::Array(_) => bail!("{} is a section, not a value", key),
        _ => Value::String(raw.to_string()),
    };
    *slot = value;
    serde_json::from_value(doc).with_context(|| format!("Invalid value for {}: {}", key, raw))
}

pub fn config_get(key: &str, json: bool) -> Result<()> {
    let workspace = Workspace::find()?;
    let config = serde_json::to_value(workspace.config()?)?;
    let value = config_value(&config, key)?;

    if json {
        println!("{}", serde_json::to_string(value)?);
    } else {
        match value {
            serde_json::Value::String(s) => println!("{}", s),
            serde_json::Value::Object(_) => println!("{}", serde_json::to_string_pretty(value)?),
            other => println!("{}", other),
        }
    }

    Ok(())
}

pub fn config_set(key: &str, value: &str) -> Result<()> {
    let workspace = Workspace::find()?;
    let config_path = workspace.config_path();
    let config = with_config_value(&Config::load(&config_path)?, key, value)?;

    config.save(&config_path)?;
    println!("{} Set {} = {}", "✓".green(), key, value);

    Ok(())
}
