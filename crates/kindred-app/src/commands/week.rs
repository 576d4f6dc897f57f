use anyhow::Result;
use chrono::Utc;

use super::{flush_toasts, load_app};

pub async fn run() -> Result<()> {
    let (app, mut toasts) = load_app()?;
    let tz = app.timezone();
    let now = Utc::now();
    let window = app.agenda().week_of(now);

    let result = app.agenda().this_week(now).await;
    flush_toasts(&mut toasts);
    let events = result.map_err(|e| anyhow::anyhow!("{} ({})", e.user_message(), e))?;

    println!(
        "Week of {} to {}",
        window.start.with_timezone(&tz).format("%a %d %b"),
        window.end.with_timezone(&tz).format("%a %d %b"),
    );

    if events.is_empty() {
        println!("No events this week");
        return Ok(());
    }

    let mut current_day = None;
    for event in &events {
        let start = event.start.with_timezone(&tz);
        let day = start.date_naive();
        if current_day != Some(day) {
            println!();
            println!("{}", start.format("%A %d %B"));
            current_day = Some(day);
        }

        let time = if event.all_day {
            "all day".to_string()
        } else {
            format!("{}-{}", start.format("%H:%M"), event.end.with_timezone(&tz).format("%H:%M"))
        };
        println!("  {:<11} {}", time, event.title);
    }

    Ok(())
}
