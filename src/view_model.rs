// View model handed to the presentation layer
use crate::grouping::{RenderUnit, group_exercises};
use crate::models::{Exercise, Plan};
use crate::pager::Navigation;
use chrono::NaiveDate;
use std::collections::HashMap;

/// Plan metadata shown above the exercise list.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanMeta {
    pub id: String,
    pub name: String,
    pub swap_date: NaiveDate,
    pub swap_date_label: String,
    pub notes: Option<String>,
}

/// An exercise enriched with its last known load and image reference.
#[derive(Debug, Clone, PartialEq)]
pub struct ExerciseView {
    pub id: String,
    pub name: String,
    pub set_count: u32,
    pub rep_spec: String,
    pub inline_technique: Option<String>,
    pub resolved_load: Option<f64>,
    pub resolved_image: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewModel {
    pub plan: PlanMeta,
    pub navigation: Navigation,
    /// Empty when the plan has no exercises.
    pub units: Vec<RenderUnit<ExerciseView>>,
}

impl ViewModel {
    pub fn has_exercises(&self) -> bool {
        !self.units.is_empty()
    }

    pub fn exercises(&self) -> impl Iterator<Item = &ExerciseView> {
        self.units.iter().flat_map(|u| u.members().iter())
    }
}

pub fn format_swap_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

/// Compose the renderable view of `plan`.
///
/// Exercises are grouped by technique, then each one gets the load recorded
/// under its name in `loads` and either its own image reference or whatever
/// `image_lookup` finds for its name.
pub fn build_view_model<F>(
    plan: &Plan,
    navigation: Navigation,
    loads: &HashMap<String, f64>,
    image_lookup: F,
) -> ViewModel
where
    F: Fn(&str) -> Option<String>,
{
    let units = group_exercises(&plan.exercises)
        .into_iter()
        .map(|unit| unit.map(|ex| exercise_view(ex, loads, &image_lookup)))
        .collect();

    ViewModel {
        plan: PlanMeta {
            id: plan.id.clone(),
            name: plan.name.clone(),
            swap_date: plan.swap_date,
            swap_date_label: format_swap_date(plan.swap_date),
            notes: non_blank(plan.notes.as_deref()),
        },
        navigation,
        units,
    }
}

fn exercise_view<F>(ex: &Exercise, loads: &HashMap<String, f64>, image_lookup: &F) -> ExerciseView
where
    F: Fn(&str) -> Option<String>,
{
    let resolved_image = non_blank(ex.image_ref.as_deref()).or_else(|| image_lookup(&ex.name));
    ExerciseView {
        id: ex.id.clone(),
        name: ex.name.clone(),
        set_count: ex.set_count,
        rep_spec: ex.rep_spec.clone(),
        inline_technique: ex.inline_technique().map(str::to_string),
        resolved_load: loads.get(&ex.name).copied(),
        resolved_image,
    }
}

fn non_blank(text: Option<&str>) -> Option<String> {
    text.map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ex(id: &str, name: &str, group: Option<&str>, tech: Option<&str>) -> Exercise {
        Exercise {
            id: id.into(),
            name: name.into(),
            set_count: 4,
            rep_spec: "10".into(),
            technique: tech.map(Into::into),
            technique_group: group.map(Into::into),
            image_ref: None,
        }
    }

    fn plan(exercises: Vec<Exercise>, notes: Option<&str>) -> Plan {
        Plan {
            id: "p1".into(),
            name: "Upper A".into(),
            swap_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            notes: notes.map(Into::into),
            exercises,
        }
    }

    fn catalog(name: &str) -> Option<String> {
        (name == "Fly").then(|| "/gifs/fly.gif".to_string())
    }

    #[test]
    fn enriches_exercises_with_loads_and_images() {
        let mut bench = ex("1", "Bench", Some("g1"), Some("Super-set"));
        bench.image_ref = Some("https://cdn.example/bench.gif".into());
        let exercises = vec![
            bench,
            ex("2", "Fly", None, None),
            ex("3", "Row", Some("g1"), Some("Super-set")),
            ex("4", "Plank", None, Some("Isometria")),
        ];
        let loads = HashMap::from([("Bench".to_string(), 82.5), ("Fly".to_string(), 14.0)]);
        let vm = build_view_model(&plan(exercises, None), Navigation::default(), &loads, catalog);

        assert_eq!(vm.units.len(), 3);
        let group = vm.units[0].members();
        assert_eq!(group[0].resolved_load, Some(82.5));
        assert_eq!(group[0].resolved_image.as_deref(), Some("https://cdn.example/bench.gif"));
        assert_eq!(group[0].inline_technique, None);
        assert_eq!(group[1].name, "Row");
        assert_eq!(group[1].resolved_load, None);
        assert_eq!(group[1].resolved_image, None);

        let fly = &vm.units[1].members()[0];
        assert_eq!(fly.resolved_image.as_deref(), Some("/gifs/fly.gif"));
        assert_eq!(fly.resolved_load, Some(14.0));

        let plank = &vm.units[2].members()[0];
        assert_eq!(plank.inline_technique.as_deref(), Some("Isometria"));
        assert_eq!(vm.exercises().count(), 4);
    }

    #[test]
    fn blank_image_ref_falls_back_to_lookup() {
        let mut fly = ex("1", "Fly", None, None);
        fly.image_ref = Some("  ".into());
        let vm = build_view_model(&plan(vec![fly], None), Navigation::default(), &HashMap::new(), catalog);
        assert_eq!(vm.units[0].members()[0].resolved_image.as_deref(), Some("/gifs/fly.gif"));
    }

    #[test]
    fn plan_meta_formats_date_and_drops_blank_notes() {
        let vm = build_view_model(&plan(Vec::new(), Some("   ")), Navigation::default(), &HashMap::new(), catalog);
        assert_eq!(vm.plan.swap_date_label, "01/06/2024");
        assert_eq!(vm.plan.notes, None);
        assert_eq!(vm.plan.name, "Upper A");
        assert!(!vm.has_exercises());
        assert!(vm.units.is_empty());

        let vm = build_view_model(&plan(Vec::new(), Some("Drink water")), Navigation::default(), &HashMap::new(), catalog);
        assert_eq!(vm.plan.notes.as_deref(), Some("Drink water"));
    }

    #[test]
    fn carries_navigation_through() {
        let nav = Navigation {
            has_previous: true,
            has_next: false,
            current_index: 1,
            total_count: 2,
        };
        let vm = build_view_model(&plan(Vec::new(), None), nav, &HashMap::new(), |_: &str| None);
        assert_eq!(vm.navigation, nav);
    }
}
