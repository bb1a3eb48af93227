use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A student authenticated for the current session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: String,
    pub display_name: String,
}

impl Student {
    /// First token of the display name, used for the greeting.
    pub fn first_name(&self) -> &str {
        self.display_name
            .split_whitespace()
            .next()
            .unwrap_or(self.display_name.as_str())
    }
}

/// A dated set of prescribed exercises.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub id: String,
    pub name: String,
    pub swap_date: NaiveDate,
    pub notes: Option<String>,
    pub exercises: Vec<Exercise>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Exercise {
    pub id: String,
    pub name: String,
    pub set_count: u32,
    pub rep_spec: String,
    pub technique: Option<String>,
    pub technique_group: Option<String>,
    pub image_ref: Option<String>,
}

impl Exercise {
    /// Technique shown on the exercise card itself.
    ///
    /// Grouped exercises carry their technique on the group header instead.
    pub fn inline_technique(&self) -> Option<&str> {
        match self.technique_group {
            Some(_) => None,
            None => self.technique.as_deref(),
        }
    }
}

/// One historical load record.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadEntry {
    pub student_id: String,
    pub exercise_name: String,
    pub load: f64,
    pub recorded_on: NaiveDate,
}

/// A load value as typed by the student, not yet validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadInput {
    pub exercise_name: String,
    pub value: String,
}

impl LoadInput {
    pub fn new(exercise_name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            exercise_name: exercise_name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Previous,
    Next,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_name_takes_leading_token() {
        let s = Student {
            id: "1".into(),
            display_name: "Maria  da Silva".into(),
        };
        assert_eq!(s.first_name(), "Maria");

        let blank = Student {
            id: "2".into(),
            display_name: String::new(),
        };
        assert_eq!(blank.first_name(), "");
    }

    #[test]
    fn grouped_exercise_has_no_inline_technique() {
        let mut ex = Exercise {
            name: "Plank".into(),
            technique: Some("Isometria".into()),
            ..Default::default()
        };
        assert_eq!(ex.inline_technique(), Some("Isometria"));

        ex.technique_group = Some("g1".into());
        assert_eq!(ex.inline_technique(), None);
    }
}
