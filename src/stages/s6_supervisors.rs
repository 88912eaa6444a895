//! STAGE 6: SUPERVISOR ASSIGNMENT
//!
//! Greedy best-fit over the cluster's supervisors. Groups are visited in
//! descending total area; each takes the supervisor with the *smallest*
//! remaining capacity that still accommodates its distinct farmer count and
//! area, and that supervisor's remaining capacity is decremented tentatively.
//!
//! Remaining capacity is `min(farmer slots, area left)` when the supervisor has
//! an area cap, otherwise farmer slots. A group nobody can take keeps
//! `supervisor_id = None`; the caller turns that into a capacity warning.

use rustc_hash::FxHashSet;

use crate::stages::CandidatePlot;
use crate::types::{SupervisorId, SupervisorRecord, SupervisorTotals};

/// What a group asks of its supervisor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroupDemand {
    /// Distinct farmers in the group
    pub farmers: u32,
    /// Hectares
    pub area: f64,
}

impl GroupDemand {
    pub fn for_members(members: &[usize], plots: &[CandidatePlot]) -> Self {
        let farmers: FxHashSet<_> = members.iter().map(|&i| plots[i].farmer_id).collect();
        Self {
            farmers: farmers.len() as u32,
            area: members.iter().map(|&i| plots[i].area).sum(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SupervisorAssignment {
    /// One entry per demand, same order as the input
    pub assignments: Vec<Option<SupervisorId>>,
    /// Running-total increments, ordered by supervisor id
    pub totals: Vec<SupervisorTotals>,
    /// Supervisors that had any capacity left before assignment
    pub available: usize,
}

impl SupervisorAssignment {
    pub fn unassigned(&self) -> impl Iterator<Item = usize> + '_ {
        self.assignments
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_none())
            .map(|(i, _)| i)
    }

    pub fn assigned_count(&self) -> usize {
        self.assignments.iter().filter(|s| s.is_some()).count()
    }
}

/// Tentative capacity left on one supervisor
#[derive(Debug, Clone)]
struct Remaining {
    id: SupervisorId,
    farmers: u32,
    area: Option<f64>,
}

impl Remaining {
    fn from_record(record: &SupervisorRecord) -> Self {
        Self {
            id: record.id,
            farmers: record.max_farmer_capacity.saturating_sub(record.current_farmer_count),
            area: record
                .max_area_capacity
                .map(|cap| (cap - record.current_total_area).max(0.0)),
        }
    }

    fn has_capacity(&self) -> bool {
        self.farmers > 0 && self.area.map_or(true, |a| a > 0.0)
    }

    fn fits(&self, demand: &GroupDemand) -> bool {
        self.farmers >= demand.farmers && self.area.map_or(true, |a| a + 1e-9 >= demand.area)
    }

    fn capacity(&self) -> f64 {
        match self.area {
            Some(area) => (self.farmers as f64).min(area),
            None => self.farmers as f64,
        }
    }

    fn take(&mut self, demand: &GroupDemand) {
        self.farmers -= demand.farmers;
        if let Some(area) = self.area.as_mut() {
            *area = (*area - demand.area).max(0.0);
        }
    }
}

pub fn assign_supervisors(demands: &[GroupDemand], supervisors: &[SupervisorRecord]) -> SupervisorAssignment {
    let mut pool: Vec<Remaining> = supervisors.iter().map(Remaining::from_record).collect();
    let available = pool.iter().filter(|r| r.has_capacity()).count();

    let mut order: Vec<usize> = (0..demands.len()).collect();
    order.sort_by(|&a, &b| demands[b].area.total_cmp(&demands[a].area).then(a.cmp(&b)));

    let mut assignments = vec![None; demands.len()];
    let mut totals: Vec<SupervisorTotals> = Vec::new();

    for g in order {
        let demand = &demands[g];
        let best = pool
            .iter_mut()
            .filter(|r| r.fits(demand))
            .min_by(|a, b| a.capacity().total_cmp(&b.capacity()).then(a.id.cmp(&b.id)));

        let Some(supervisor) = best else {
            tracing::debug!(
                "No supervisor can take group {} ({} farmers, {:.2} ha)",
                g + 1,
                demand.farmers,
                demand.area
            );
            continue;
        };

        supervisor.take(demand);
        assignments[g] = Some(supervisor.id);

        match totals.iter_mut().find(|t| t.supervisor_id == supervisor.id) {
            Some(t) => {
                t.farmers_added += demand.farmers;
                t.area_added += demand.area;
            }
            None => totals.push(SupervisorTotals {
                supervisor_id: supervisor.id,
                farmers_added: demand.farmers,
                area_added: demand.area,
            }),
        }
    }

    totals.sort_by_key(|t| t.supervisor_id);

    SupervisorAssignment {
        assignments,
        totals,
        available,
    }
}
