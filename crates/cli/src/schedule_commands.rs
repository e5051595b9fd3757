use {
    anyhow::Result,
    cadence_batch::Schedule,
    chrono::{DateTime, Utc},
};

/// Print the next `count` fire times of `expr` after `after` (default now).
pub fn next(expr: &str, count: usize, after: Option<DateTime<Utc>>) -> Result<()> {
    let schedule = Schedule::parse(expr)?;
    let fire_times = upcoming(&schedule, after.unwrap_or_else(Utc::now), count);
    if fire_times.is_empty() {
        eprintln!("'{schedule}' never fires after the given time");
    }
    for time in fire_times {
        println!("{}", time.to_rfc3339());
    }
    Ok(())
}

fn upcoming(schedule: &Schedule, after: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
    std::iter::successors(schedule.next_fire_time(after), |t| {
        schedule.next_fire_time(*t)
    })
    .take(count)
    .collect()
}
