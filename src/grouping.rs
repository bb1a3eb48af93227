use crate::models::Exercise;

/// One renderable block of a plan: a lone exercise or a technique group.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderUnit<T> {
    Single(T),
    Group {
        technique: Option<String>,
        members: Vec<T>,
    },
}

impl<T> RenderUnit<T> {
    pub fn members(&self) -> &[T] {
        match self {
            RenderUnit::Single(item) => std::slice::from_ref(item),
            RenderUnit::Group { members, .. } => members,
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, RenderUnit::Group { .. })
    }

    /// Transform every member while keeping the unit shape.
    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> RenderUnit<U> {
        match self {
            RenderUnit::Single(item) => RenderUnit::Single(f(item)),
            RenderUnit::Group { technique, members } => RenderUnit::Group {
                technique,
                members: members.into_iter().map(f).collect(),
            },
        }
    }
}

/// Partition a plan's exercises into ordered render units.
///
/// An exercise with a technique group pulls every exercise sharing that group
/// into one unit placed where the first member appears, even when other
/// exercises sit between the members in the input. Everything else becomes a
/// `Single`. A group with one member is still a group.
pub fn group_exercises(exercises: &[Exercise]) -> Vec<RenderUnit<&Exercise>> {
    let mut placed = vec![false; exercises.len()];
    let mut units = Vec::new();

    for (i, ex) in exercises.iter().enumerate() {
        if placed[i] {
            continue;
        }
        let Some(group_id) = ex.technique_group.as_deref() else {
            placed[i] = true;
            units.push(RenderUnit::Single(ex));
            continue;
        };

        let mut members = Vec::new();
        for (j, other) in exercises.iter().enumerate().skip(i) {
            if !placed[j] && other.technique_group.as_deref() == Some(group_id) {
                placed[j] = true;
                members.push(other);
            }
        }
        let technique = group_label(ex, &members);
        units.push(RenderUnit::Group { technique, members });
    }

    units
}

// The triggering exercise names the group. Members that disagree are
// reported but do not change the label.
fn group_label(trigger: &Exercise, members: &[&Exercise]) -> Option<String> {
    let label = trigger
        .technique
        .clone()
        .or_else(|| members.iter().find_map(|m| m.technique.clone()));
    if let Some(ref label) = label {
        let mismatched: Vec<&str> = members
            .iter()
            .filter_map(|m| m.technique.as_deref())
            .filter(|t| *t != label.as_str())
            .collect();
        if !mismatched.is_empty() {
            log::warn!(
                "Technique group {:?} mixes techniques; showing {label:?}, also found {mismatched:?}",
                trigger.technique_group
            );
        }
    }
    label
}
