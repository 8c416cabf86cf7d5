use dbx::error::Result;
use dbx::session::SessionManager;

pub fn run_ls(manager: &SessionManager) -> Result<()> {
    let summaries = manager.list();
    if summaries.is_empty() {
        println!("no sessions");
        return Ok(());
    }

    println!("KEY\tENDPOINT\tSTATE\tUPTIME\tPID\tERROR");
    for summary in summaries {
        println!(
            "{}\t{}\t{}\t{}\t{}\t{}",
            summary.key,
            summary.endpoint(),
            summary.state,
            summary.uptime_display(),
            summary.pid.unwrap_or(0),
            summary.last_error.clone().unwrap_or_default(),
        );
    }

    Ok(())
}
