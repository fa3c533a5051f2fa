use std::io::{self, IsTerminal};

use time::{Date, Duration, OffsetDateTime};

use crate::backup::BackupInfo;
use crate::domain::{format_date, HabitStore, Priority, Task, TimerStore};
use crate::ids::display_id;
use crate::sync::SyncStatus;

pub fn print_task_list(tasks: &[Task], today: Date) {
    let palette = Palette::auto();
    println!("{}", palette.heading("Tasks"));
    if tasks.is_empty() {
        println!("{}", palette.dim("no tasks"));
        return;
    }
    for task in tasks {
        println!("{}", format_task_row(task, today, &palette));
    }
    let pending = tasks.iter().filter(|task| !task.done).count();
    println!(
        "{}",
        palette.dim(&format!("{} task(s), {} pending", tasks.len(), pending))
    );
}

fn format_task_row(task: &Task, today: Date, palette: &Palette) -> String {
    let check = if task.done { "[x]" } else { "[ ]" };
    let text = if task.done {
        palette.dim(&task.text)
    } else {
        task.text.clone()
    };
    let mut line = format!("{} {} {}", check, palette.id(display_id(&task.id)), text);

    if !task.priority.is_none() {
        line.push(' ');
        line.push_str(&palette.priority(task.priority));
    }
    if !task.project.is_empty() {
        line.push(' ');
        line.push_str(&palette.tags(&format!("@{}", task.project)));
    }
    if let Some(due) = task.due_date {
        line.push(' ');
        let label = format!("due {}", format_date(due));
        if !task.done && due < today {
            line.push_str(&palette.alert(&format!("{label} (overdue)")));
        } else {
            line.push_str(&palette.dim(&label));
        }
    }
    line
}

pub fn print_habit_list(habits: &HabitStore, today: Date) {
    let palette = Palette::auto();
    println!("{}", palette.heading("Habits"));
    if habits.habits.is_empty() {
        println!("{}", palette.dim("no habits"));
        return;
    }
    for habit in &habits.habits {
        let week = week_strip(&habits.week_at(&habit.id, today));
        let streak = habits.streak_at(&habit.id, today);
        let mut line = format!(
            "{} {} {} {}",
            palette.id(display_id(&habit.id)),
            habit.icon,
            habit.name,
            palette.dim(&week)
        );
        if streak > 0 {
            line.push(' ');
            line.push_str(&palette.done(&format!("{streak}d streak")));
        }
        if !habit.frequency.is_daily() {
            line.push(' ');
            line.push_str(&palette.tags(&format!("({})", habit.frequency)));
        }
        println!("{line}");
    }
}

/// Oldest day on the left; filled squares are completed days.
fn week_strip(days: &[bool; 7]) -> String {
    days.iter().map(|done| if *done { '■' } else { '□' }).collect()
}

pub fn print_timer_status(timer: &TimerStore, now: OffsetDateTime) {
    let palette = Palette::auto();
    match &timer.current {
        Some(current) => println!(
            "{} {} {}",
            palette.done("running"),
            current.project,
            palette.dim(&format_duration(current.elapsed(now)))
        ),
        None => println!("{}", palette.dim("no timer running")),
    }
    println!("today {}", format_duration(timer.today_total(now)));
    println!("week  {}", format_duration(timer.week_total(now)));
}

pub fn print_timer_report(projects: &[(String, Duration)], days: &[(Date, Duration)]) {
    let palette = Palette::auto();
    println!("{}", palette.heading("Projects"));
    if projects.is_empty() {
        println!("{}", palette.dim("no tracked time"));
    }
    for (project, total) in projects {
        println!("{:>8}  {}", format_duration(*total), project);
    }
    println!("{}", palette.heading("Days"));
    let mut days = days.to_vec();
    days.sort_by_key(|(date, _)| *date);
    for (date, total) in &days {
        println!("{}  {:>8}", format_date(*date), format_duration(*total));
    }
}

pub fn print_sync_status(status: &SyncStatus) {
    let palette = Palette::auto();
    if !status.is_repo {
        println!("{}", palette.dim("not a git repository (run `tend sync init`)"));
        return;
    }
    println!("branch  {}", status.branch);
    match &status.remote {
        Some(remote) => println!("remote  {} {}", remote.name, palette.dim(&remote.url)),
        None => println!("remote  {}", palette.dim("none")),
    }
    println!("ahead   {}  behind {}", status.ahead, status.behind);
    let state = if status.dirty {
        palette.alert("uncommitted changes")
    } else {
        palette.done("clean")
    };
    println!("state   {state}");
    if let Some(at) = status.last_commit {
        println!("last    {}", format_timestamp(at));
    }
    if status.pending > 0 {
        println!("pending {}", status.pending);
    }
}

pub fn print_backup_list(backups: &[BackupInfo]) {
    let palette = Palette::auto();
    println!("{}", palette.heading("Backups"));
    if backups.is_empty() {
        println!("{}", palette.dim("no backups"));
        return;
    }
    for backup in backups {
        let detail = match &backup.manifest {
            Some(manifest) => manifest
                .counts
                .iter()
                .map(|(file, count)| format!("{}={}", file.trim_end_matches(".json"), count))
                .collect::<Vec<_>>()
                .join(" "),
            None => "no manifest".to_string(),
        };
        println!(
            "{} {} {}",
            palette.id(&backup.name),
            format_timestamp(backup.created_at),
            palette.dim(&detail)
        );
    }
}

pub fn format_duration(duration: Duration) -> String {
    let minutes = duration.whole_minutes().max(0);
    let hours = minutes / 60;
    let rest = minutes % 60;
    if hours > 0 {
        format!("{hours}h {rest:02}m")
    } else {
        format!("{rest}m")
    }
}

fn format_timestamp(at: OffsetDateTime) -> String {
    format!(
        "{} {:02}:{:02}",
        format_date(at.date()),
        at.hour(),
        at.minute()
    )
}

struct Palette {
    enabled: bool,
}

impl Palette {
    fn auto() -> Self {
        let enabled = std::env::var_os("NO_COLOR").is_none() && io::stdout().is_terminal();
        Self { enabled }
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.enabled {
            format!("\x1b[{code}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }

    fn heading(&self, text: &str) -> String {
        self.paint("1;36", text)
    }

    fn dim(&self, text: &str) -> String {
        self.paint("2", text)
    }

    fn id(&self, text: &str) -> String {
        self.paint("1;94", text)
    }

    fn done(&self, text: &str) -> String {
        self.paint("32", text)
    }

    fn alert(&self, text: &str) -> String {
        self.paint("31", text)
    }

    fn tags(&self, text: &str) -> String {
        self.paint("90", text)
    }

    fn priority(&self, priority: Priority) -> String {
        self.paint(
            priority_color_code(priority),
            &format!("!{}", priority.as_str()),
        )
    }
}

fn priority_color_code(priority: Priority) -> &'static str {
    match priority {
        Priority::High => "31",
        Priority::Medium => "33",
        Priority::Low => "34",
        Priority::None => "37",
    }
}
