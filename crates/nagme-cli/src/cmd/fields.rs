//! Field flags shared by `nag add` and `nag edit`, turned into a
//! [`NagPatch`].

use anyhow::{Result, bail};
use clap::Args;

use nagme_core::duration::parse_duration_ms;
use nagme_core::event::NagPatch;
use nagme_core::model::{CalendarPattern, CalendarRule, Recurrence};
use nagme_core::timefmt::parse_datetime;

#[derive(Args, Debug, Clone, Default)]
pub struct NagFieldArgs {
    /// Bucket (Work, Personal, Weekend, Holiday, Project, or any other name).
    #[arg(short, long, help_heading = "Fields")]
    pub bucket: Option<String>,

    /// Project name, for nags in the Project bucket.
    #[arg(long, help_heading = "Fields")]
    pub project: Option<String>,

    /// Due date/time: `YYYY-MM-DD HH:MM`, `YYYY-MM-DD`, RFC 3339 or epoch ms.
    #[arg(short, long, help_heading = "Fields")]
    pub due: Option<String>,

    /// Importance, 0..=100.
    #[arg(short, long, help_heading = "Fields")]
    pub weight: Option<u32>,

    /// Days past due before the nag is fully late.
    #[arg(long, help_heading = "Fields")]
    pub lateness_days: Option<u32>,

    /// Explicit progress, 0..=1; overrides the time-based value.
    #[arg(long, help_heading = "Fields")]
    pub progress: Option<f64>,

    /// Single-glyph icon.
    #[arg(long, help_heading = "Fields")]
    pub icon: Option<String>,

    /// Enable or disable reminders.
    #[arg(long, help_heading = "Fields")]
    pub notifications: Option<bool>,

    /// Hide a recurring nag until this many days before each due.
    #[arg(long, help_heading = "Fields")]
    pub visible_days: Option<u32>,

    /// Repeat every DURATION (e.g. `7d`, `12h`).
    #[arg(long, value_name = "DURATION", help_heading = "Recurrence", conflicts_with = "pattern")]
    pub every: Option<String>,

    /// First boundary of an `--every` rule; defaults to the due, then now.
    #[arg(long, help_heading = "Recurrence", requires = "every")]
    pub anchor: Option<String>,

    /// Calendar pattern: day-of-month, day-of-week, nth-weekday-of-month,
    /// end-of-month, quarterly, annual.
    #[arg(long, help_heading = "Recurrence")]
    pub pattern: Option<CalendarPattern>,

    /// Time of day for calendar patterns.
    #[arg(long, value_name = "HH:MM", value_parser = parse_clock, help_heading = "Recurrence")]
    pub at: Option<(u32, u32)>,

    /// Day of month, 1..=31.
    #[arg(long, help_heading = "Recurrence")]
    pub day: Option<u32>,

    /// Weekday: sun..sat or 1..=7 (Sunday = 1).
    #[arg(long, value_parser = parse_weekday, help_heading = "Recurrence")]
    pub weekday: Option<u32>,

    /// Which weekday of the month, 1..=5 (5 = last).
    #[arg(long, help_heading = "Recurrence")]
    pub nth: Option<u32>,

    /// Month of year for annual patterns (first quarter month for quarterly).
    #[arg(long, help_heading = "Recurrence")]
    pub month: Option<u32>,

    /// How long each occurrence stays due.
    #[arg(long, value_name = "DURATION", help_heading = "Recurrence")]
    pub window: Option<String>,

    /// Clear the due date.
    #[arg(long, conflicts_with = "due", help_heading = "Clear")]
    pub no_due: bool,

    /// Stop recurring.
    #[arg(long, conflicts_with_all = ["every", "pattern"], help_heading = "Clear")]
    pub no_recurrence: bool,

    /// Clear the project.
    #[arg(long, conflicts_with = "project", help_heading = "Clear")]
    pub no_project: bool,
}

fn parse_clock(raw: &str) -> Result<(u32, u32), String> {
    let err = || format!("invalid time '{raw}': expected HH:MM");
    let (h, m) = raw.trim().split_once(':').ok_or_else(err)?;
    let hour: u32 = h.parse().map_err(|_| err())?;
    let minute: u32 = m.parse().map_err(|_| err())?;
    if hour > 23 || minute > 59 {
        return Err(err());
    }
    Ok((hour, minute))
}

fn parse_weekday(raw: &str) -> Result<u32, String> {
    const NAMES: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];
    let clean = raw.trim().to_ascii_lowercase();
    if let Ok(n) = clean.parse::<u32>() {
        return if (1..=7).contains(&n) {
            Ok(n)
        } else {
            Err(format!("weekday {n} is outside 1..=7"))
        };
    }
    NAMES
        .iter()
        .position(|name| clean.starts_with(name))
        .and_then(|i| u32::try_from(i + 1).ok())
        .ok_or_else(|| format!("unknown weekday '{raw}'"))
}

impl NagFieldArgs {
    /// Build the patch these flags describe.
    ///
    /// # Errors
    ///
    /// Unparseable dates or durations, and values the patch would reject.
    pub fn to_patch(&self, now_ms: i64, utc_offset_minutes: i32) -> Result<NagPatch> {
        let due = self
            .due
            .as_deref()
            .map(|d| parse_datetime(d, utc_offset_minutes))
            .transpose()?;

        let mut patch = NagPatch {
            bucket: self.bucket.clone(),
            weight: self.weight,
            lateness_days: self.lateness_days,
            notifications: self.notifications,
            ..NagPatch::default()
        };
        if let Some(due) = due {
            patch.due_ms = Some(Some(due));
        } else if self.no_due {
            patch.due_ms = Some(None);
        }
        if let Some(project) = &self.project {
            patch.project = Some(Some(project.clone()));
        } else if self.no_project {
            patch.project = Some(None);
        }
        if let Some(progress) = self.progress {
            patch.progress = Some(Some(progress));
        }
        if let Some(icon) = &self.icon {
            patch.icon = Some(Some(icon.clone()));
        }
        if let Some(days) = self.visible_days {
            patch.visible_days_before_due = Some(Some(days));
        }
        if self.no_recurrence {
            patch.recurrence = Some(None);
        } else if let Some(recurrence) = self.recurrence(due, now_ms, utc_offset_minutes)? {
            patch.recurrence = Some(Some(recurrence));
        }

        if let Err(reason) = patch.validate() {
            bail!("invalid nag fields: {reason}");
        }
        Ok(patch)
    }

    fn recurrence(&self, due: Option<i64>, now_ms: i64, utc_offset_minutes: i32) -> Result<Option<Recurrence>> {
        let window = self.window.as_deref().map(parse_duration_ms).transpose()?;

        if let Some(every) = &self.every {
            let period_ms = parse_duration_ms(every)?;
            if period_ms <= 0 {
                bail!("--every must be positive");
            }
            let anchor_ms = match &self.anchor {
                Some(anchor) => parse_datetime(anchor, utc_offset_minutes)?,
                None => due.unwrap_or(now_ms),
            };
            return Ok(Some(Recurrence::every(
                period_ms,
                anchor_ms,
                window.unwrap_or(period_ms),
            )));
        }

        let Some(pattern) = self.pattern else {
            if self.at.is_some() || self.day.is_some() || self.weekday.is_some() || self.nth.is_some() {
                bail!("calendar fields need --pattern");
            }
            return Ok(None);
        };
        let (hour, minute) = self.at.unwrap_or((0, 0));
        let mut rule = CalendarRule::new(pattern, hour, minute);
        rule.day_of_month = self.day;
        rule.day_of_week = self.weekday;
        rule.nth_week = self.nth;
        rule.utc_offset_minutes = utc_offset_minutes;
        match pattern {
            CalendarPattern::Quarterly => rule.quarter_anchor_month = self.month,
            _ => rule.month_of_year = self.month,
        }
        let mut recurrence = Recurrence::calendar(rule);
        if let Some(window) = window {
            recurrence.window_ms = window;
        }
        Ok(Some(recurrence))
    }
}
