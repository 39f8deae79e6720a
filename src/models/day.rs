//! Canonical weekday codes for visit scheduling.
//!
//! Routes are worked on fixed weekdays, so most cached entities are
//! partitioned by day. The day-code is part of the durable storage-key
//! contract and must stay stable across releases: writers and readers
//! derive partition keys from the same canonical code.

use std::fmt;

use chrono::{Datelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// A visit day, serialized with its canonical lowercase Spanish code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisitDay {
    Lunes,
    Martes,
    Miercoles,
    Jueves,
    Viernes,
    Sabado,
    Domingo,
}

impl VisitDay {
    pub const ALL: [VisitDay; 7] = [
        VisitDay::Lunes,
        VisitDay::Martes,
        VisitDay::Miercoles,
        VisitDay::Jueves,
        VisitDay::Viernes,
        VisitDay::Sabado,
        VisitDay::Domingo,
    ];

    /// Canonical code used in storage keys and on the wire.
    /// ASCII only - accented forms are accepted on parse, never emitted.
    pub fn code(&self) -> &'static str {
        match self {
            VisitDay::Lunes => "lunes",
            VisitDay::Martes => "martes",
            VisitDay::Miercoles => "miercoles",
            VisitDay::Jueves => "jueves",
            VisitDay::Viernes => "viernes",
            VisitDay::Sabado => "sabado",
            VisitDay::Domingo => "domingo",
        }
    }

    /// Parse a day code, tolerating case and the accented spellings that
    /// show up in spreadsheet-sourced data.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized: String = raw
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| match c {
                'á' => 'a',
                'é' => 'e',
                'í' => 'i',
                'ó' => 'o',
                'ú' => 'u',
                other => other,
            })
            .collect();
        match normalized.as_str() {
            "lunes" => Some(VisitDay::Lunes),
            "martes" => Some(VisitDay::Martes),
            "miercoles" => Some(VisitDay::Miercoles),
            "jueves" => Some(VisitDay::Jueves),
            "viernes" => Some(VisitDay::Viernes),
            "sabado" => Some(VisitDay::Sabado),
            "domingo" => Some(VisitDay::Domingo),
            _ => None,
        }
    }

    pub fn from_weekday(weekday: Weekday) -> Self {
        match weekday {
            Weekday::Mon => VisitDay::Lunes,
            Weekday::Tue => VisitDay::Martes,
            Weekday::Wed => VisitDay::Miercoles,
            Weekday::Thu => VisitDay::Jueves,
            Weekday::Fri => VisitDay::Viernes,
            Weekday::Sat => VisitDay::Sabado,
            Weekday::Sun => VisitDay::Domingo,
        }
    }

    /// Today's visit day (UTC).
    pub fn today() -> Self {
        Self::from_weekday(Utc::now().weekday())
    }
}

impl fmt::Display for VisitDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
