/// Ceiling for the summed cost of world content.
pub const TOTAL_BUDGET: f32 = 300.0;

const COST_EPSILON: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BudgetTracker {
    total_cost: f32,
    budget: f32,
    /// Levels may turn limiting off; admission then never fails on cost.
    pub limit_budget: bool,
}

impl Default for BudgetTracker {
    fn default() -> Self {
        Self {
            total_cost: 0.0,
            budget: TOTAL_BUDGET,
            limit_budget: true,
        }
    }
}

impl BudgetTracker {
    pub fn total_cost(&self) -> f32 {
        self.total_cost
    }

    pub fn budget(&self) -> f32 {
        self.budget
    }

    pub fn under_budget(&self) -> bool {
        self.total_cost <= self.budget
    }

    pub fn over_budget(&self) -> bool {
        !self.under_budget()
    }

    /// True when admitting `cost` more would push the total past the ceiling.
    pub fn would_exceed(&self, cost: f32) -> bool {
        self.limit_budget && self.total_cost + cost > self.budget
    }

    pub fn fraction_full(&self) -> f32 {
        self.fraction_full_unclamped().clamp(0.0, 1.0)
    }

    pub fn fraction_full_unclamped(&self) -> f32 {
        if self.budget <= 0.0 {
            return 1.0;
        }
        self.total_cost / self.budget
    }

    pub fn add(&mut self, cost: f32) {
        self.total_cost += cost;
    }

    pub fn subtract(&mut self, cost: f32) {
        debug_assert!(
            self.total_cost + COST_EPSILON >= cost,
            "removing cost {cost} from total {}",
            self.total_cost
        );
        self.total_cost = (self.total_cost - cost).max(0.0);
    }

    /// Zeroes the total on teardown instead of subtracting each thing.
    pub fn reset_actor_cost(&mut self) {
        self.total_cost = 0.0;
    }
}
