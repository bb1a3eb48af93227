use crate::models::Plan;

/// Navigation state of the plan pager.
///
/// Plans are ordered newest first, so moving "next" goes to an older plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Navigation {
    pub has_previous: bool,
    pub has_next: bool,
    pub current_index: usize,
    pub total_count: usize,
}

impl Navigation {
    /// Navigation controls are only shown when there is more than one plan.
    pub fn shows_controls(&self) -> bool {
        self.total_count > 1
    }

    pub fn has_older(&self) -> bool {
        self.has_next
    }

    pub fn has_newer(&self) -> bool {
        self.has_previous
    }
}

#[derive(Debug, Clone, Default)]
pub struct PlanPager {
    plans: Vec<Plan>,
    current: usize,
}

impl PlanPager {
    pub fn new(plans: Vec<Plan>) -> Self {
        Self { plans, current: 0 }
    }

    pub fn active(&self) -> Option<&Plan> {
        self.plans.get(self.current)
    }

    /// Returns `true` if the active plan changed.
    pub fn go_previous(&mut self) -> bool {
        if self.current > 0 {
            self.current -= 1;
            true
        } else {
            false
        }
    }

    /// Returns `true` if the active plan changed.
    pub fn go_next(&mut self) -> bool {
        if self.current + 1 < self.plans.len() {
            self.current += 1;
            true
        } else {
            false
        }
    }

    pub fn navigation(&self) -> Navigation {
        let total_count = self.plans.len();
        Navigation {
            has_previous: self.current > 0,
            has_next: self.current + 1 < total_count,
            current_index: self.current,
            total_count,
        }
    }
}
