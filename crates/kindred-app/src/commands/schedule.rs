use anyhow::Result;
use chrono::{DateTime, Utc};

use kindred_core::MomentDraft;

use super::{flush_toasts, load_app};

pub async fn run(title: String, description: String, at: DateTime<Utc>, sync: bool) -> Result<()> {
    let (app, mut toasts) = load_app()?;
    let draft = MomentDraft::new(title, description, at);

    let result = if sync {
        app.moments().schedule_synced(draft).await
    } else {
        Ok(app.moments().schedule(draft))
    };
    flush_toasts(&mut toasts);

    match result {
        Ok(moment) => {
            let when = moment.date.with_timezone(&app.timezone());
            println!("Scheduled \"{}\" for {}", moment.title, when.format("%a %d %b %Y %H:%M"));
            if let Some(event_id) = &moment.calendar_event_id {
                println!("Calendar event: {}", event_id);
            }
            Ok(())
        }
        Err(e) if !app.calendar_enabled() => {
            anyhow::bail!("Google Calendar is unavailable, the moment was kept locally only: {}", e)
        }
        Err(e) => anyhow::bail!("Moment was not added to the calendar: {}", e),
    }
}
