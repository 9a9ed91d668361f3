//! Placement policies (C6). The five policies form a closed family over two
//! operations — `get_application_to_schedule` and `place_containers` — so
//! they are modeled here as a tagged `PolicyKind` dispatched through plain
//! match arms rather than an open class hierarchy ("GroupAdaptive extends
//! RoundRobin" in the original source is implementation reuse only).

use crate::application::Application;
use crate::cluster::{Cluster, InvalidPlacement};
use crate::error::ScheduleError;
use crate::estimator::GroupEstimator;
use crate::topology::{ClusterSlot, GroupTag, NO_GROUP};
use rand::distributions::Distribution;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    Random,
    RoundRobin,
    Adaptive,
    GroupAdaptive,
    GroupAdaptiveExtend,
}

impl PolicyKind {
    pub fn default_jobs_to_peek(&self) -> usize {
        match self {
            PolicyKind::Random | PolicyKind::RoundRobin => 7,
            PolicyKind::Adaptive => 8,
            PolicyKind::GroupAdaptive | PolicyKind::GroupAdaptiveExtend => 6,
        }
    }
}

impl std::fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                PolicyKind::Random => "random",
                PolicyKind::RoundRobin => "round-robin",
                PolicyKind::Adaptive => "adaptive",
                PolicyKind::GroupAdaptive => "group-adaptive",
                PolicyKind::GroupAdaptiveExtend => "group-adaptive-extend",
            }
        )
    }
}

// ---------------------------------------------------------------------
// Shared low-level placement primitives
// ---------------------------------------------------------------------

/// Place up to `k` of `app`'s yet-unplaced containers on `node_address`.
/// Placing 0 is a programming error.
pub fn place(
    cluster: &mut Cluster,
    app: &mut Application,
    node_address: &str,
    k: usize,
) -> Result<usize, InvalidPlacement> {
    if k == 0 {
        return Err(InvalidPlacement("cannot place 0 containers".to_string()));
    }
    let mut placed = 0;
    while placed < k {
        let Some(task_index) = app.next_unplaced() else {
            break;
        };
        cluster.place_container(node_address, app.id)?;
        app.assign(task_index, node_address);
        placed += 1;
    }
    Ok(placed)
}

/// Choose uniformly among non-full nodes, preferring ones that do not
/// already host this application, and place up to `k` containers there.
pub fn place_random(
    cluster: &mut Cluster,
    app: &mut Application,
    rng: &mut StdRng,
    k: usize,
) -> Result<usize, InvalidPlacement> {
    let non_full = cluster.non_full_nodes();
    if non_full.is_empty() {
        return Err(InvalidPlacement("no non-full nodes available".to_string()));
    }
    let preferred: Vec<String> = non_full
        .iter()
        .filter(|n| !n.hosts(app.id))
        .map(|n| n.address.clone())
        .collect();
    let candidates = if preferred.is_empty() {
        non_full.iter().map(|n| n.address.clone()).collect::<Vec<_>>()
    } else {
        preferred
    };
    let chosen = candidates.choose(rng).expect("candidates is non-empty").clone();
    place(cluster, app, &chosen, k)
}

// ---------------------------------------------------------------------
// place_containers
// ---------------------------------------------------------------------

pub fn place_containers(
    kind: PolicyKind,
    cluster: &mut Cluster,
    app: &mut Application,
    rng: &mut StdRng,
    existing_group: Option<GroupTag>,
) -> Result<(), InvalidPlacement> {
    match kind {
        PolicyKind::Random => place_all_random(cluster, app, rng),
        PolicyKind::RoundRobin | PolicyKind::Adaptive => place_round_robin(cluster, app, rng),
        PolicyKind::GroupAdaptive | PolicyKind::GroupAdaptiveExtend => {
            place_with_group(cluster, app, existing_group.unwrap_or(NO_GROUP))
        }
    }
}

fn place_all_random(cluster: &mut Cluster, app: &mut Application, rng: &mut StdRng) -> Result<(), InvalidPlacement> {
    while !app.is_fully_placed() {
        place_random(cluster, app, rng, 4)?;
    }
    Ok(())
}

fn place_round_robin(cluster: &mut Cluster, app: &mut Application, rng: &mut StdRng) -> Result<(), InvalidPlacement> {
    let empty_addresses: Vec<String> = cluster.empty_nodes().iter().map(|n| n.address.clone()).collect();
    for address in empty_addresses {
        if app.is_fully_placed() {
            break;
        }
        place(cluster, app, &address, 4)?;
    }
    while !app.is_fully_placed() {
        place_random(cluster, app, rng, 4)?;
    }
    Ok(())
}

fn place_with_group(
    cluster: &mut Cluster,
    app: &mut Application,
    existing_group: GroupTag,
) -> Result<(), InvalidPlacement> {
    if existing_group == NO_GROUP {
        let chosen_slot = if cluster.has_application_running() {
            ClusterSlot::Slot2
        } else {
            ClusterSlot::Slot1
        };
        app.cluster_slot = Some(chosen_slot);
        let addresses: Vec<String> = cluster
            .nodes()
            .iter()
            .filter(|n| cluster.slot_of(&n.address) == Some(chosen_slot))
            .map(|n| n.address.clone())
            .collect();
        for address in addresses {
            place(cluster, app, &address, 4)?;
        }
    } else {
        let co_located = cluster
            .applications(false)
            .into_iter()
            .find(|a| a.group == existing_group)
            .cloned();
        if let Some(co_located) = co_located {
            app.cluster_slot = co_located.cluster_slot;
            let addresses: Vec<String> = co_located.nodes.iter().cloned().collect();
            for address in addresses {
                place(cluster, app, &address, 4)?;
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------
// get_application_to_schedule
// ---------------------------------------------------------------------

/// Bump the waiting-time of every application in the peek window, once the
/// scheduler has admitted more than two applications (the first scheduling
/// round is intentionally not counted).
fn bump_waiting_times(queue: &mut VecDeque<Application>, index: &[usize], scheduled_apps_num: u64) {
    if scheduled_apps_num > 2 {
        for &i in index {
            queue[i].waiting_time += 1;
        }
    }
}

fn peek_window(queue: &VecDeque<Application>, jobs_to_peek: usize) -> Vec<usize> {
    (0..jobs_to_peek.min(queue.len())).collect()
}

#[allow(clippy::too_many_arguments)]
pub fn get_application_to_schedule(
    kind: PolicyKind,
    queue: &mut VecDeque<Application>,
    cluster: &Cluster,
    estimator: &dyn GroupEstimator,
    jobs_to_peek: usize,
    scheduled_apps_num: u64,
    waiting_limit: Option<u64>,
    rng: &mut StdRng,
) -> Result<(Application, Option<GroupTag>), ScheduleError> {
    match kind {
        PolicyKind::Random | PolicyKind::RoundRobin => {
            let app = queue
                .pop_front()
                .ok_or(ScheduleError::NoApplicationCanBeScheduled)?;
            Ok((app, None))
        }
        PolicyKind::Adaptive => {
            adaptive_select(queue, cluster, estimator, jobs_to_peek, scheduled_apps_num)
        }
        PolicyKind::GroupAdaptive => group_adaptive_select(
            queue,
            cluster,
            estimator,
            jobs_to_peek,
            scheduled_apps_num,
            rng,
        ),
        PolicyKind::GroupAdaptiveExtend => group_adaptive_extend_select(
            queue,
            cluster,
            estimator,
            jobs_to_peek,
            scheduled_apps_num,
            waiting_limit.unwrap_or(jobs_to_peek as u64 * 2),
            rng,
        ),
    }
}

fn adaptive_select(
    queue: &mut VecDeque<Application>,
    cluster: &Cluster,
    estimator: &dyn GroupEstimator,
    jobs_to_peek: usize,
    scheduled_apps_num: u64,
) -> Result<(Application, Option<GroupTag>), ScheduleError> {
    let mut index = peek_window(queue, jobs_to_peek);
    bump_waiting_times(queue, &index, scheduled_apps_num);

    let (scheduled_apps, scheduled_weights) = cluster.applications_by_name(false);
    let scheduled_groups: Vec<GroupTag> = scheduled_apps.iter().map(|a| a.group).collect();

    while !index.is_empty() {
        let candidate_groups: Vec<GroupTag> = index.iter().map(|&i| queue[i].group).collect();
        let best_in_window =
            estimator.best_app_index(&scheduled_groups, &candidate_groups, Some(&scheduled_weights));
        let queue_idx = index[best_in_window];

        if queue[queue_idx].n_containers <= cluster.available_containers() {
            let app = queue.remove(queue_idx).expect("queue_idx is in bounds");
            return Ok((app, None));
        }
        index.remove(best_in_window);
    }
    Err(ScheduleError::NoApplicationCanBeScheduled)
}

fn group_adaptive_select(
    queue: &mut VecDeque<Application>,
    cluster: &Cluster,
    estimator: &dyn GroupEstimator,
    jobs_to_peek: usize,
    scheduled_apps_num: u64,
    rng: &mut StdRng,
) -> Result<(Application, Option<GroupTag>), ScheduleError> {
    let mut index = peek_window(queue, jobs_to_peek);
    bump_waiting_times(queue, &index, scheduled_apps_num);

    let (scheduled_apps, _weights) = cluster.applications_by_name(false);
    let scheduled_groups: Vec<GroupTag> = scheduled_apps.iter().map(|a| a.group).collect();

    while !index.is_empty() {
        let candidate_groups: Vec<GroupTag> = index.iter().map(|&i| queue[i].group).collect();
        let (best_group_to_schedule, best_existing_group) =
            estimator.best_group_pair(&scheduled_groups, &candidate_groups);

        if best_group_to_schedule == NO_GROUP {
            let window_pos = rng.gen_range(0..index.len());
            let queue_idx = index[window_pos];
            let app = queue.remove(queue_idx).expect("queue_idx is in bounds");
            return Ok((app, Some(best_existing_group)));
        }

        let matching: Vec<usize> = index
            .iter()
            .copied()
            .filter(|&i| queue[i].group == best_group_to_schedule)
            .collect();
        if matching.is_empty() {
            // The candidate group came from the window itself, so this
            // should not happen; bail out rather than loop forever.
            break;
        }
        let queue_idx = matching[rng.gen_range(0..matching.len())];

        if queue[queue_idx].n_containers <= cluster.available_containers() {
            let app = queue.remove(queue_idx).expect("queue_idx is in bounds");
            return Ok((app, Some(best_existing_group)));
        }
        let pos_in_index = index.iter().position(|&i| i == queue_idx).unwrap();
        index.remove(pos_in_index);
    }
    Err(ScheduleError::NoApplicationCanBeScheduled)
}

#[allow(clippy::too_many_arguments)]
fn group_adaptive_extend_select(
    queue: &mut VecDeque<Application>,
    cluster: &Cluster,
    estimator: &dyn GroupEstimator,
    jobs_to_peek: usize,
    scheduled_apps_num: u64,
    waiting_limit: u64,
    rng: &mut StdRng,
) -> Result<(Application, Option<GroupTag>), ScheduleError> {
    let mut index = peek_window(queue, jobs_to_peek);

    let (scheduled_apps, _weights) = cluster.applications_by_name(false);
    let scheduled_groups: Vec<GroupTag> = scheduled_apps.iter().map(|a| a.group).collect();

    if scheduled_apps_num > 2 {
        bump_waiting_times(queue, &index, scheduled_apps_num);

        let mut late_index: Option<usize> = None;
        for &i in &index {
            if queue[i].waiting_time > waiting_limit {
                late_index = match late_index {
                    None => Some(i),
                    Some(current) if queue[i].waiting_time > queue[current].waiting_time => Some(i),
                    Some(current) => Some(current),
                };
            }
        }
        if let Some(i) = late_index {
            let colocate_group = scheduled_groups.first().copied().unwrap_or(NO_GROUP);
            let app = queue.remove(i).expect("late_index is in bounds");
            return Ok((app, Some(colocate_group)));
        }
    }

    while !index.is_empty() {
        let candidate_groups: Vec<GroupTag> = index.iter().map(|&i| queue[i].group).collect();
        let (best_group_to_schedule, best_existing_group) =
            estimator.best_group_pair(&scheduled_groups, &candidate_groups);

        if best_group_to_schedule == NO_GROUP {
            let window_pos = rng.gen_range(0..index.len());
            let queue_idx = index[window_pos];
            let app = queue.remove(queue_idx).expect("queue_idx is in bounds");
            return Ok((app, Some(best_existing_group)));
        }

        let matching: Vec<usize> = index
            .iter()
            .copied()
            .filter(|&i| queue[i].group == best_group_to_schedule)
            .collect();
        if matching.is_empty() {
            break;
        }

        let weights: Vec<usize> = matching.iter().map(|&i| (queue[i].waiting_time + 1) as usize).collect();
        let draw = rand_distr::weighted_alias::WeightedAliasIndex::new(weights)
            .expect("weights are non-empty and strictly positive");
        let queue_idx = matching[draw.sample(rng)];

        if queue[queue_idx].n_containers <= cluster.available_containers() {
            let app = queue.remove(queue_idx).expect("queue_idx is in bounds");
            return Ok((app, Some(best_existing_group)));
        }
        let pos_in_index = index.iter().position(|&i| i == queue_idx).unwrap();
        index.remove(pos_in_index);
    }
    Err(ScheduleError::NoApplicationCanBeScheduled)
}
