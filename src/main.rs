mod app;
mod backup;
mod cli;
mod clock;
mod config;
mod domain;
mod ids;
mod logging;
mod storage;
mod store;
mod sync;
mod ui;

use std::io::Read;
use std::str::FromStr;
use std::sync::Arc;

use serde_json::json;

use app::{App, AppError, RemovedHabit};
use cli::{
    BackupSubcommands, Commands, HabitSubcommands, SyncSubcommands, TaskSubcommands,
    TimerSubcommands,
};
use clock::{Clock, SystemClock};
use config::Config;
use domain::{format_date, parse_date, sort_tasks, Frequency, Priority, Task};
use store::StoreError;
use sync::FlushOutcome;

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}

fn print_json(value: &impl serde::Serialize) {
    match serde_json::to_string_pretty(value) {
        Ok(rendered) => println!("{rendered}"),
        Err(err) => eprintln!("error: failed to render JSON: {}", err),
    }
}

fn run() -> Result<(), AppError> {
    use clap::Parser;

    // The local offset can only be read while the process is single-threaded.
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::local());
    let cli = cli::Cli::parse();
    logging::init(cli.verbose);

    let config = Config::load(cli.config.as_deref())?;
    let data_dir = config.resolve_data_dir(cli.data_dir.as_deref())?;
    let app = App::open(data_dir, config, clock)?;

    if !matches!(cli.command, Commands::Sync(_)) {
        app.sync().startup();
    }
    let result = dispatch(&app, cli.command, cli.json);
    app.shutdown();
    result
}

fn dispatch(app: &App, command: Commands, json: bool) -> Result<(), AppError> {
    match command {
        Commands::Task(args) => run_task(app, args.command, json),
        Commands::Habit(args) => run_habit(app, args.command, json),
        Commands::Timer(args) => run_timer(app, args.command, json),
        Commands::Sync(args) => run_sync(app, args.command, json),
        Commands::Backup(args) => run_backup(app, args.command, json),
    }
}

fn run_task(app: &App, command: TaskSubcommands, json: bool) -> Result<(), AppError> {
    let store = app.store();
    match command {
        TaskSubcommands::Add(args) => {
            let priority = match args.priority.as_deref() {
                Some(raw) => Priority::from_str(raw).map_err(StoreError::from)?,
                None => Priority::None,
            };
            let due = args.due.as_deref().map(parse_due).transpose()?;
            let task = store.add_task(
                &args.text,
                args.project.as_deref().unwrap_or(""),
                priority,
                due,
            )?;
            report_task(&task, "added", json);
        }
        TaskSubcommands::Ls(args) => {
            let mut tasks: Vec<Task> = store
                .load_tasks()?
                .value
                .tasks
                .into_iter()
                .filter(|task| args.all || !task.done)
                .filter(|task| {
                    args.project
                        .as_deref()
                        .is_none_or(|project| task.project.eq_ignore_ascii_case(project.trim()))
                })
                .collect();
            sort_tasks(&mut tasks);
            if json {
                print_json(&tasks);
            } else {
                ui::print_task_list(&tasks, store.now().date());
            }
        }
        TaskSubcommands::Done(args) => {
            let id = app.resolve_task_id(&args.id)?;
            let task = store.complete_task(&id)?;
            report_task(&task, "completed", json);
        }
        TaskSubcommands::Reopen(args) => {
            let id = app.resolve_task_id(&args.id)?;
            let task = store.uncomplete_task(&id)?;
            report_task(&task, "reopened", json);
        }
        TaskSubcommands::Rm(args) => {
            let id = app.resolve_task_id(&args.id)?;
            let task = store.delete_task(&id)?;
            report_task(&task, "deleted", json);
        }
        TaskSubcommands::Restore(args) => {
            let task: Task = serde_json::from_str(&read_payload(&args.json)?)?;
            let task = store.restore_task(task)?;
            report_task(&task, "restored", json);
        }
    }
    Ok(())
}

fn report_task(task: &Task, verb: &str, json: bool) {
    if json {
        print_json(task);
    } else {
        println!("{} {} {}", verb, ids::display_id(&task.id), task.text);
    }
}

fn parse_due(raw: &str) -> Result<time::Date, AppError> {
    parse_date(raw).map_err(|err| {
        AppError::Store(StoreError::Validation(format!(
            "invalid due date '{}': {}",
            raw, err
        )))
    })
}

fn run_habit(app: &App, command: HabitSubcommands, json: bool) -> Result<(), AppError> {
    let store = app.store();
    match command {
        HabitSubcommands::Add(args) => {
            let habit = match args.frequency.as_deref() {
                Some(raw) => {
                    let frequency = Frequency::from_str(raw).map_err(StoreError::from)?;
                    store.add_habit_with_schedule(&args.name, &args.icon, frequency, &args.days)?
                }
                None => store.add_habit(&args.name, &args.icon)?,
            };
            if json {
                print_json(&habit);
            } else {
                println!("added {} {} {}", ids::display_id(&habit.id), habit.icon, habit.name);
            }
        }
        HabitSubcommands::Ls => {
            let habits = store.load_habits()?.value;
            let today = store.now().date();
            if json {
                let rows: Vec<_> = habits
                    .habits
                    .iter()
                    .map(|habit| {
                        json!({
                            "habit": habit,
                            "done_today": habits.is_done_on(&habit.id, today),
                            "streak": store.habit_streak(&habits, &habit.id),
                            "week": store.habit_week(&habits, &habit.id),
                        })
                    })
                    .collect();
                print_json(&rows);
            } else {
                ui::print_habit_list(&habits, today);
            }
        }
        HabitSubcommands::Toggle(args) => {
            let id = app.resolve_habit_id(&args.id)?;
            let done = store.toggle_habit_today(&id)?;
            if json {
                print_json(&json!({ "id": id, "done_today": done }));
            } else {
                let state = if done { "done" } else { "not done" };
                println!("{} {} today", ids::display_id(&id), state);
            }
        }
        HabitSubcommands::Set(args) => {
            let id = app.resolve_habit_id(&args.id)?;
            let done = !args.undone;
            store.set_habit_done_on_date(&id, &args.date, done)?;
            if json {
                print_json(&json!({ "id": id, "date": args.date.trim(), "done": done }));
            } else {
                let state = if done { "done" } else { "cleared" };
                println!("{} {} on {}", ids::display_id(&id), state, args.date.trim());
            }
        }
        HabitSubcommands::Rm(args) => {
            let id = app.resolve_habit_id(&args.id)?;
            let removed = app.remove_habit(&id)?;
            if json {
                print_json(&removed);
            } else {
                println!(
                    "deleted {} {} ({} day(s) of history)",
                    ids::display_id(&removed.habit.id),
                    removed.habit.name,
                    removed.logs.len()
                );
            }
        }
        HabitSubcommands::Restore(args) => {
            let removed: RemovedHabit = serde_json::from_str(&read_payload(&args.json)?)?;
            let habit = app.restore_habit(removed)?;
            if json {
                print_json(&habit);
            } else {
                println!("restored {} {}", ids::display_id(&habit.id), habit.name);
            }
        }
    }
    Ok(())
}

fn run_timer(app: &App, command: TimerSubcommands, json: bool) -> Result<(), AppError> {
    let store = app.store();
    match command {
        TimerSubcommands::Start(args) => {
            let current = store.start_timer(&args.project)?;
            if json {
                print_json(&current);
            } else {
                println!("started {}", current.project);
            }
        }
        TimerSubcommands::Stop => {
            let entry = store.stop_timer()?;
            match (entry, json) {
                (entry, true) => print_json(&entry),
                (Some(entry), false) => println!(
                    "stopped {} after {}",
                    entry.project,
                    ui::format_duration(entry.duration())
                ),
                (None, false) => println!("no timer running"),
            }
        }
        TimerSubcommands::Status => {
            let timer = store.load_timer()?.value;
            let now = store.now();
            if json {
                print_json(&json!({
                    "current": timer.current,
                    "elapsed_minutes": timer.current.as_ref().map(|current| current.elapsed(now).whole_minutes()),
                    "today_minutes": store.today_total(&timer).whole_minutes(),
                    "week_minutes": store.week_total(&timer).whole_minutes(),
                }));
            } else {
                ui::print_timer_status(&timer, now);
            }
        }
        TimerSubcommands::Report(args) => {
            let timer = store.load_timer()?.value;
            let projects = store.project_totals(&timer, args.days)?;
            let days = store.daily_breakdown(&timer, args.days)?;
            if json {
                print_json(&json!({
                    "projects": projects
                        .iter()
                        .map(|(project, total)| json!({ "project": project, "minutes": total.whole_minutes() }))
                        .collect::<Vec<_>>(),
                    "days": days
                        .iter()
                        .map(|(date, total)| json!({ "date": format_date(*date), "minutes": total.whole_minutes() }))
                        .collect::<Vec<_>>(),
                }));
            } else {
                ui::print_timer_report(&projects, &days);
            }
        }
    }
    Ok(())
}

fn run_sync(app: &App, command: SyncSubcommands, json: bool) -> Result<(), AppError> {
    let engine = app.sync();
    match command {
        SyncSubcommands::Init => {
            let outcome = engine.init()?;
            if json {
                print_json(&outcome);
            } else if outcome.created {
                println!("initialized git repository in {}", engine.data_dir().display());
            } else {
                println!("git repository already initialized");
            }
        }
        SyncSubcommands::Status => {
            let status = engine.status()?;
            if json {
                print_json(&status);
            } else {
                ui::print_sync_status(&status);
            }
        }
        SyncSubcommands::Commit(args) => {
            let outcome = engine.commit_all(args.message.as_deref())?;
            if json {
                print_json(&outcome);
            } else {
                match outcome {
                    FlushOutcome::Committed(summary) => println!(
                        "committed {} {}",
                        &summary.commit[..summary.commit.len().min(8)],
                        summary.message
                    ),
                    FlushOutcome::NoChanges | FlushOutcome::NothingPending => {
                        println!("nothing to commit")
                    }
                }
            }
        }
        SyncSubcommands::Push => {
            engine.push()?;
            if json {
                print_json(&json!({ "pushed": true }));
            } else {
                println!("pushed");
            }
        }
        SyncSubcommands::Pull => {
            engine.pull()?;
            if json {
                print_json(&json!({ "pulled": true }));
            } else {
                println!("pulled");
            }
        }
    }
    Ok(())
}

fn run_backup(app: &App, command: BackupSubcommands, json: bool) -> Result<(), AppError> {
    let backups = app.backups();
    match command {
        BackupSubcommands::Create => {
            let info = backups.create()?;
            if json {
                print_json(&info);
            } else {
                println!("created backup {}", info.name);
            }
        }
        BackupSubcommands::Ls => {
            let list = backups.list()?;
            if json {
                print_json(&list);
            } else {
                ui::print_backup_list(&list);
            }
        }
        BackupSubcommands::Restore(args) => {
            let summary = backups.restore(&args.name)?;
            if json {
                print_json(&summary);
            } else {
                println!(
                    "restored {} (previous data saved as {})",
                    summary.name, summary.safety_backup
                );
            }
        }
        BackupSubcommands::Prune(args) => {
            let keep = args.keep.unwrap_or(app.config().backup.keep);
            let deleted = backups.prune(keep)?;
            if json {
                print_json(&json!({ "deleted": deleted, "kept": keep }));
            } else {
                println!("deleted {} backup(s)", deleted);
            }
        }
    }
    Ok(())
}

/// `-` means stdin.
fn read_payload(raw: &str) -> Result<String, AppError> {
    if raw.trim() != "-" {
        return Ok(raw.to_string());
    }
    let mut buffer = String::new();
    std::io::stdin().read_to_string(&mut buffer)?;
    Ok(buffer)
}
