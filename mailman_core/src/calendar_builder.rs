//! Turns delivery dates into an iCalendar document.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use ical::{
    generator::{Emitter, IcalCalendar, IcalCalendarBuilder, IcalEvent, IcalEventBuilder, Property},
    ical_property,
};
use uuid::Uuid;

use crate::{clock::Clock, config::CalendarConfig, date_sequence::DateSequence};

static DATE_FORMAT: &str = "%Y%m%d";
static STAMP_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// A built calendar. Never changed after it has been built.
#[derive(Debug)]
pub struct CalendarArtifact {
    calendar: IcalCalendar,
}

impl CalendarArtifact {
    pub fn calendar(&self) -> &IcalCalendar {
        &self.calendar
    }

    pub fn events(&self) -> &[IcalEvent] {
        &self.calendar.events
    }

    /// Serialize to `text/calendar`, with CRLF line endings.
    pub fn to_ics(&self) -> String {
        // Values are escaped by the emitter, so every raw LF is a line break or a fold.
        self.calendar.generate().replace('\n', "\r\n")
    }
}

#[derive(Debug)]
pub struct CalendarBuilder {
    config: CalendarConfig,
    clock: Arc<dyn Clock>,
}

impl CalendarBuilder {
    pub fn new(config: CalendarConfig, clock: Arc<dyn Clock>) -> Self {
        CalendarBuilder { config, clock }
    }

    /// Build a calendar with one all-day event per date.
    ///
    /// Every build gets fresh event ids.
    pub fn build(&self, dates: &DateSequence) -> CalendarArtifact {
        let stamp = self
            .clock
            .now()
            .with_timezone(&Utc)
            .format(STAMP_FORMAT)
            .to_string();
        let mut calendar = IcalCalendarBuilder::version("2.0")
            .gregorian()
            .prodid(&self.config.product_id)
            .build();
        calendar.properties.extend([
            ical_property!("NAME", &self.config.name),
            ical_property!("X-WR-CALNAME", &self.config.name),
            ical_property!("TIMEZONE-ID", &self.config.timezone),
            ical_property!("X-WR-TIMEZONE", &self.config.timezone),
        ]);
        calendar.events = dates
            .iter()
            .map(|date| self.build_event(*date, &stamp))
            .collect();
        CalendarArtifact { calendar }
    }

    fn build_event(&self, date: NaiveDate, stamp: &str) -> IcalEvent {
        IcalEventBuilder::tzid(&self.config.timezone)
            .uid(Uuid::new_v4().to_string())
            .changed_utc(stamp)
            .one_day(date.format(DATE_FORMAT).to_string())
            .set(ical_property!("SEQUENCE", "0"))
            .set(ical_property!("X-MICROSOFT-CDO-ALLDAYEVENT", "TRUE"))
            .set(ical_property!("X-MICROSOFT-MSNCALENDAR-ALLDAYEVENT", "TRUE"))
            .set(ical_property!("SUMMARY", &self.config.summary))
            .build()
    }
}
