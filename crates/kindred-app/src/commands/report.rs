use anyhow::Result;
use chrono::Utc;

use kindred_email::SubmitOutcome;

use super::{flush_toasts, load_app};

pub async fn run(issues: String, wellbeing: String) -> Result<()> {
    let (app, mut toasts) = load_app()?;

    let form = app.weekly_form();
    form.set_weekly_issues(issues);
    form.set_wellbeing(wellbeing);

    let outcome = app.submit_weekly_update(Utc::now()).await;
    flush_toasts(&mut toasts);

    match outcome {
        SubmitOutcome::Sent => Ok(()),
        SubmitOutcome::Rejected(_) => anyhow::bail!("Both --issues and --wellbeing need some text"),
        SubmitOutcome::Refused | SubmitOutcome::Failed => anyhow::bail!("Weekly update was not sent"),
    }
}
