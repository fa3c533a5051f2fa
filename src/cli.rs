use std::path::PathBuf;

use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::{Args, Parser, Subcommand};

use crate::store::MAX_REPORT_DAYS;

fn cli_styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::BrightCyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::BrightYellow.on_default() | Effects::BOLD)
        .literal(AnsiColor::BrightGreen.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::BrightMagenta.on_default())
}

#[derive(Debug, Parser)]
#[command(name = "tend")]
#[command(bin_name = "tend")]
#[command(version)]
#[command(about = "Local-first tasks, habits and time tracking with git-backed history")]
#[command(styles = cli_styles())]
pub struct Cli {
    #[arg(
        short = 'D',
        long,
        global = true,
        env = "TEND_DATA_DIR",
        help = "Directory holding tasks.json, habits.json and timer.json."
    )]
    pub data_dir: Option<PathBuf>,

    #[arg(
        short = 'c',
        long,
        global = true,
        env = "TEND_CONFIG",
        help = "Config file (defaults to <config dir>/tend/config.toml)."
    )]
    pub config: Option<PathBuf>,

    #[arg(short = 'j', long, global = true, help = "Render machine-readable JSON.")]
    pub json: bool,

    #[arg(short = 'v', long, global = true, help = "Log debug output to stderr.")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    #[command(about = "Add, list, complete and remove tasks.")]
    Task(TaskArgs),
    #[command(about = "Track daily habits.")]
    Habit(HabitArgs),
    #[command(about = "Track time per project.")]
    Timer(TimerArgs),
    #[command(about = "Git-backed history of the data directory.")]
    Sync(SyncArgs),
    #[command(about = "Snapshot and restore the data files.")]
    Backup(BackupArgs),
}

#[derive(Debug, Args)]
pub struct TaskArgs {
    #[command(subcommand)]
    pub command: TaskSubcommands,
}

#[derive(Debug, Subcommand)]
pub enum TaskSubcommands {
    #[command(about = "Add a task.")]
    Add(TaskAddArgs),
    #[command(about = "List tasks, pending first.")]
    Ls(TaskListArgs),
    #[command(about = "Mark a task done.")]
    Done(IdArg),
    #[command(about = "Mark a done task pending again.")]
    Reopen(IdArg),
    #[command(about = "Delete a task (prints it so it can be restored).")]
    Rm(IdArg),
    #[command(about = "Put back a deleted task from its JSON.")]
    Restore(RestoreArgs),
}

#[derive(Debug, Args)]
pub struct TaskAddArgs {
    #[arg(help = "Task text.")]
    pub text: String,

    #[arg(short = 'p', long, help = "Project name.")]
    pub project: Option<String>,

    #[arg(
        short = 'P',
        long,
        help = "Priority: none, low, medium or high."
    )]
    pub priority: Option<String>,

    #[arg(long, help = "Due date (YYYY-MM-DD).")]
    pub due: Option<String>,
}

#[derive(Debug, Args)]
pub struct TaskListArgs {
    #[arg(short = 'a', long, help = "Include completed tasks.")]
    pub all: bool,

    #[arg(short = 'p', long, help = "Only tasks in this project.")]
    pub project: Option<String>,
}

#[derive(Debug, Args)]
pub struct IdArg {
    #[arg(help = "Full id or the short id shown in listings.")]
    pub id: String,
}

#[derive(Debug, Args)]
pub struct RestoreArgs {
    #[arg(id = "payload", value_name = "JSON", help = "JSON printed by `rm --json`, or '-' to read it from stdin.")]
    pub json: String,
}

#[derive(Debug, Args)]
pub struct HabitArgs {
    #[command(subcommand)]
    pub command: HabitSubcommands,
}

#[derive(Debug, Subcommand)]
pub enum HabitSubcommands {
    #[command(about = "Add a habit.")]
    Add(HabitAddArgs),
    #[command(about = "List habits with the last seven days and streak.")]
    Ls,
    #[command(about = "Flip today's completion.")]
    Toggle(IdArg),
    #[command(about = "Mark a habit done or not done on a given day.")]
    Set(HabitSetArgs),
    #[command(about = "Delete a habit and its history.")]
    Rm(IdArg),
    #[command(about = "Put back a deleted habit from its JSON.")]
    Restore(RestoreArgs),
}

#[derive(Debug, Args)]
pub struct HabitAddArgs {
    #[arg(help = "Habit name.")]
    pub name: String,

    #[arg(short = 'i', long, default_value = "•", help = "Short icon or emoji.")]
    pub icon: String,

    #[arg(
        short = 'f',
        long,
        help = "Frequency: daily, weekly, weekdays or custom."
    )]
    pub frequency: Option<String>,

    #[arg(
        long = "day",
        help = "Day for custom frequency, 0 = Sunday (repeatable)."
    )]
    pub days: Vec<u8>,
}

#[derive(Debug, Args)]
pub struct HabitSetArgs {
    #[arg(help = "Full or short habit id.")]
    pub id: String,

    #[arg(help = "Day (YYYY-MM-DD).")]
    pub date: String,

    #[arg(long, help = "Clear the day instead of marking it done.")]
    pub undone: bool,
}

#[derive(Debug, Args)]
pub struct TimerArgs {
    #[command(subcommand)]
    pub command: TimerSubcommands,
}

#[derive(Debug, Subcommand)]
pub enum TimerSubcommands {
    #[command(about = "Start tracking a project, stopping any running timer.")]
    Start(TimerStartArgs),
    #[command(about = "Stop the running timer.")]
    Stop,
    #[command(about = "Show the running timer and today's and this week's totals.")]
    Status,
    #[command(about = "Per-project and per-day totals.")]
    Report(TimerReportArgs),
}

#[derive(Debug, Args)]
pub struct TimerStartArgs {
    #[arg(help = "Project name.")]
    pub project: String,
}

#[derive(Debug, Args)]
pub struct TimerReportArgs {
    #[arg(
        short = 'd',
        long,
        default_value_t = 7,
        value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_REPORT_DAYS)),
        help = "Number of days, today included."
    )]
    pub days: u32,
}

#[derive(Debug, Args)]
pub struct SyncArgs {
    #[command(subcommand)]
    pub command: SyncSubcommands,
}

#[derive(Debug, Subcommand)]
pub enum SyncSubcommands {
    #[command(about = "Make the data directory a git repository.")]
    Init,
    #[command(about = "Branch, remote, ahead/behind and dirty state.")]
    Status,
    #[command(about = "Commit every data file now.")]
    Commit(SyncCommitArgs),
    #[command(about = "Push to the configured remote.")]
    Push,
    #[command(about = "Pull (rebase) from the configured remote.")]
    Pull,
}

#[derive(Debug, Args)]
pub struct SyncCommitArgs {
    #[arg(short = 'm', long, help = "Commit message.")]
    pub message: Option<String>,
}

#[derive(Debug, Args)]
pub struct BackupArgs {
    #[command(subcommand)]
    pub command: BackupSubcommands,
}

#[derive(Debug, Subcommand)]
pub enum BackupSubcommands {
    #[command(about = "Snapshot the data files.")]
    Create,
    #[command(about = "List backups, newest first.")]
    Ls,
    #[command(about = "Restore a backup after taking a safety backup.")]
    Restore(BackupRestoreArgs),
    #[command(about = "Delete all but the newest backups.")]
    Prune(BackupPruneArgs),
}

#[derive(Debug, Args)]
pub struct BackupRestoreArgs {
    #[arg(help = "Backup name from `tend backup ls`.")]
    pub name: String,
}

#[derive(Debug, Args)]
pub struct BackupPruneArgs {
    #[arg(short = 'k', long, help = "How many to keep (defaults to [backup] keep).")]
    pub keep: Option<usize>,
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};

    use super::{Cli, Commands, HabitSubcommands, TaskSubcommands, TimerSubcommands};

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_parse_after_subcommands() {
        let cli = Cli::try_parse_from([
            "tend", "task", "add", "Buy milk", "-P", "high", "--due", "2026-03-11", "--json",
        ])
        .expect("task add should parse");
        assert!(cli.json);
        let Commands::Task(args) = cli.command else {
            panic!("expected task command");
        };
        let TaskSubcommands::Add(add) = args.command else {
            panic!("expected task add");
        };
        assert_eq!(add.text, "Buy milk");
        assert_eq!(add.priority.as_deref(), Some("high"));
        assert_eq!(add.due.as_deref(), Some("2026-03-11"));
    }

    #[test]
    fn custom_days_repeat() {
        let cli = Cli::try_parse_from([
            "tend", "habit", "add", "Gym", "-f", "custom", "--day", "1", "--day", "3",
        ])
        .expect("habit add should parse");
        let Commands::Habit(args) = cli.command else {
            panic!("expected habit command");
        };
        let HabitSubcommands::Add(add) = args.command else {
            panic!("expected habit add");
        };
        assert_eq!(add.days, vec![1, 3]);
        assert_eq!(add.icon, "•");
    }

    #[test]
    fn report_days_are_range_checked() {
        let cli = Cli::try_parse_from(["tend", "timer", "report", "--days", "3660"])
            .expect("largest window should parse");
        let Commands::Timer(args) = cli.command else {
            panic!("expected timer command");
        };
        let TimerSubcommands::Report(report) = args.command else {
            panic!("expected timer report");
        };
        assert_eq!(report.days, 3660);

        for days in ["0", "3661", "5000000"] {
            assert!(
                Cli::try_parse_from(["tend", "timer", "report", "--days", days]).is_err(),
                "--days {days} should be rejected"
            );
        }
    }
}
