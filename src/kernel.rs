//! Per-agent transition function.
//!
//! `update_agents` runs one invocation per active agent on the rayon pool. Each
//! invocation reads only the previous buffer, the grid built from it and the published
//! trail, and writes only its own slot of the next buffer plus one deposit into the
//! trail's hidden buffer.

use crate::boundary::apply_boundary;
use crate::grid::SpatialHashGrid;
use crate::particle_store::Agent;
use crate::pointer::{pointer_force, PointerState};
use crate::trail::TrailField;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use swarm_common::{angle_difference, angle_to_vec, vec_to_angle, wrap_angle, SimParams, Vec2};

/// Everything an invocation may read during the update pass.
pub struct KernelContext<'a> {
    pub params: &'a SimParams,
    pub grid: Option<&'a SpatialHashGrid>,
    pub trail: &'a TrailField,
    pub pointer: PointerState,
    pub dt: f32,
    pub tick: u64,
    pub seed: u64,
    pub width: f32,
    pub height: f32,
}

/// Seeds the per-agent tie-break RNG. Index and tick are spread by different odd
/// multipliers so `(i + 1, t)` and `(i, t + 1)` never share a stream.
#[inline(always)]
fn tie_break_seed(seed: u64, index: u32, tick: u64) -> u64 {
    seed ^ (index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ tick.wrapping_mul(0xC2B2_AE3D_27D4_EB4F)
}

/// Turn (radians) towards the stronger side of the three-sensor reading.
fn trail_steering(index: u32, agent: &Agent, ctx: &KernelContext) -> f32 {
    let params = ctx.params;
    let channel = agent.species as usize % ctx.trail.channels();
    let origin = Vec2::new(agent.x, agent.y);
    let sense = |offset: f32| {
        let p = origin + angle_to_vec(agent.heading + offset) * params.sensor_distance;
        ctx.trail.sample(channel, p.x, p.y, params.boundary)
    };
    let center = sense(0.0);
    let left = sense(params.sensor_angle);
    let right = sense(-params.sensor_angle);

    let turn = params.turn_rate * params.intensity * ctx.dt;
    if center > left && center > right {
        0.0
    } else if left > right {
        turn
    } else if right > left {
        -turn
    } else {
        let mut rng = StdRng::seed_from_u64(tie_break_seed(ctx.seed, index, ctx.tick));
        if rng.random::<bool>() { turn } else { -turn }
    }
}

/// Flocking and collision steering from one traversal of the 3x3 cell window.
fn neighbor_steering(index: u32, agent: &Agent, agents: &[Agent], grid: &SpatialHashGrid, params: &SimParams) -> Vec2 {
    let position = Vec2::new(agent.x, agent.y);
    let flock_r2 = params.flocking_radius * params.flocking_radius;
    let collide_r = params.collision_radius;
    let collide_r2 = collide_r * collide_r;

    let mut heading_sum = Vec2::zero();
    let mut separation = Vec2::zero();
    let mut centroid = Vec2::zero();
    let mut flock_count = 0u32;
    let mut push = Vec2::zero();

    grid.for_each_neighbor(agent.x, agent.y, |other_idx| {
        if other_idx == index {
            return true;
        }
        let Some(other) = agents.get(other_idx as usize) else {
            return true;
        };
        let other_pos = Vec2::new(other.x, other.y);
        let away = position - other_pos;
        let d2 = away.length_squared();

        if params.flocking && d2 < flock_r2 {
            heading_sum += angle_to_vec(other.heading);
            centroid += other_pos;
            if d2 > 1e-12 {
                // Unit direction divided by distance.
                separation += away / d2;
            }
            flock_count += 1;
        }
        if params.collision && d2 < collide_r2 && d2 > 1e-12 {
            let d = d2.sqrt();
            push += (away / d) * (params.restitution * (1.0 - d / collide_r));
        }
        true
    });

    let mut steering = push;
    if flock_count > 0 {
        let n = flock_count as f32;
        let own = angle_to_vec(agent.heading);
        let alignment = (heading_sum / n).normalize_or_zero() - own;
        let cohesion = (centroid / n - position).normalize_or_zero();
        steering += alignment * params.alignment_weight
            + separation.normalize_or_zero() * params.separation_weight
            + cohesion * params.cohesion_weight;
    }
    steering
}

/// Computes the next state of agent `index`.
pub fn update_agent(index: u32, agent: &Agent, agents: &[Agent], ctx: &KernelContext) -> Agent {
    let params = ctx.params;
    let mut heading = agent.heading;

    // 1. Chemotaxis.
    if params.trail_following {
        heading += trail_steering(index, agent, ctx);
    }

    // 2-3. Flocking and collision avoidance.
    let mut force = match ctx.grid {
        Some(grid) if params.needs_neighbors() => neighbor_steering(index, agent, agents, grid, params),
        _ => Vec2::zero(),
    };

    // 4. Pointer.
    force += pointer_force(Vec2::new(agent.x, agent.y), &ctx.pointer, params);

    // 5. Inertia blend towards the combined direction.
    let desired_vec = angle_to_vec(heading) + force;
    let desired = if desired_vec.length_squared() > 1e-12 { vec_to_angle(desired_vec) } else { heading };
    let new_heading = wrap_angle(agent.heading + angle_difference(agent.heading, desired) * (1.0 - params.inertia));

    // 6. Integration.
    let direction = angle_to_vec(new_heading);
    let speed = (agent.speed + force.dot(direction) * params.acceleration * ctx.dt)
        .clamp(params.speed_min, params.speed_max);
    let moved = Vec2::new(agent.x, agent.y) + direction * (speed * ctx.dt);

    // 7. Topology.
    let (x, y, heading) = apply_boundary(params.boundary, moved.x, moved.y, new_heading, ctx.width, ctx.height);

    // 8. Deposit.
    if params.deposit_amount > 0.0 {
        let channel = agent.species as usize % ctx.trail.channels();
        ctx.trail.deposit(channel, x, y, params.deposit_amount);
    }

    Agent { x, y, heading, speed, species: agent.species }
}

/// Parallel update pass over the active range.
pub fn update_agents(current: &[Agent], next: &mut [Agent], ctx: &KernelContext) {
    next.par_iter_mut()
        .zip(current.par_iter())
        .enumerate()
        .for_each(|(idx, (out, agent))| {
            *out = update_agent(idx as u32, agent, current, ctx);
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;
    use swarm_common::{BoundaryMode, TrailFormat};

    fn still_params() -> SimParams {
        SimParams {
            trail_following: false,
            flocking: false,
            collision: false,
            inertia: 0.0,
            speed_min: 0.0,
            speed_max: 100.0,
            deposit_amount: 0.0,
            ..SimParams::default()
        }
    }

    fn ctx<'a>(params: &'a SimParams, trail: &'a TrailField, grid: Option<&'a SpatialHashGrid>) -> KernelContext<'a> {
        KernelContext {
            params,
            grid,
            trail,
            pointer: PointerState { position: Vec2::zero(), pressed: false },
            dt: 0.1,
            tick: 0,
            seed: 1,
            width: 100.0,
            height: 100.0,
        }
    }

    fn agent(x: f32, y: f32, heading: f32, speed: f32) -> Agent {
        Agent { x, y, heading, speed, species: 0 }
    }

    /// Makes pending deposits visible to sensors without altering them.
    fn publish(trail: &mut TrailField) {
        trail.diffuse(&SimParams {
            fade: 1.0,
            diffusion: 0.0,
            exposure: 0.0,
            auto_dim_threshold: 1.0e6,
            ..SimParams::default()
        });
    }

    fn sensing_params() -> SimParams {
        SimParams {
            trail_following: true,
            sensor_angle: PI / 4.0,
            sensor_distance: 10.0,
            turn_rate: 2.0,
            intensity: 1.0,
            ..still_params()
        }
    }

    #[test]
    fn straight_line_motion() {
        let params = still_params();
        let trail = TrailField::new(100, 100, TrailFormat::R).expect("trail");
        let a = agent(10.0, 10.0, 0.0, 10.0);
        let out = update_agent(0, &a, &[a], &ctx(&params, &trail, None));
        assert!((out.x - 11.0).abs() < 1e-5);
        assert!((out.y - 10.0).abs() < 1e-5);
        assert_eq!(out.heading, 0.0);
    }

    #[test]
    fn speed_is_clamped_into_bounds() {
        let params = SimParams { speed_min: 5.0, speed_max: 8.0, ..still_params() };
        let trail = TrailField::new(100, 100, TrailFormat::R).expect("trail");
        let fast = update_agent(0, &agent(50.0, 50.0, 0.0, 100.0), &[], &ctx(&params, &trail, None));
        let slow = update_agent(0, &agent(50.0, 50.0, 0.0, 0.0), &[], &ctx(&params, &trail, None));
        assert_eq!(fast.speed, 8.0);
        assert_eq!(slow.speed, 5.0);
    }

    #[test]
    fn bounce_off_the_right_edge() {
        let params = SimParams { boundary: BoundaryMode::Bounce, ..still_params() };
        let trail = TrailField::new(100, 100, TrailFormat::R).expect("trail");
        let theta = 0.2f32;
        let out = update_agent(0, &agent(99.9, 50.0, theta, 10.0), &[], &ctx(&params, &trail, None));
        assert_eq!(out.x, 100.0);
        assert!((out.heading - (PI - theta)).abs() < 1e-6);
    }

    #[test]
    fn bounce_off_the_top_edge() {
        let params = SimParams { boundary: BoundaryMode::Bounce, ..still_params() };
        let trail = TrailField::new(100, 100, TrailFormat::R).expect("trail");
        let theta = 1.2f32;
        let out = update_agent(0, &agent(50.0, 99.9, theta, 10.0), &[], &ctx(&params, &trail, None));
        assert_eq!(out.y, 100.0);
        assert!((out.heading + theta).abs() < 1e-6);
    }

    #[test]
    fn turns_towards_the_stronger_sensor() {
        let params = sensing_params();
        let mut trail = TrailField::new(100, 100, TrailFormat::R).expect("trail");
        // Left sensor of an agent at (50, 50) heading +x sits at ~(57.07, 57.07).
        trail.deposit(0, 57.0, 57.0, 10.0);
        publish(&mut trail);
        let out = update_agent(0, &agent(50.0, 50.0, 0.0, 1.0), &[], &ctx(&params, &trail, None));
        assert!((out.heading - 0.2).abs() < 1e-5, "heading {}", out.heading);
    }

    #[test]
    fn strong_center_with_equal_sides_keeps_heading() {
        let params = sensing_params();
        let mut trail = TrailField::new(100, 100, TrailFormat::R).expect("trail");
        // Center sensor of an agent at (50, 50) heading +x sits at (60, 50).
        trail.deposit(0, 60.0, 50.0, 10.0);
        publish(&mut trail);
        for index in 0..8 {
            let out = update_agent(index, &agent(50.0, 50.0, 0.0, 1.0), &[], &ctx(&params, &trail, None));
            assert_eq!(out.heading, 0.0);
        }
    }

    #[test]
    fn tie_break_is_reproducible_per_agent_and_tick() {
        let params = SimParams { trail_following: true, turn_rate: 1.0, ..still_params() };
        let trail = TrailField::new(100, 100, TrailFormat::R).expect("trail");
        let a = agent(50.0, 50.0, 0.0, 1.0);
        let c = ctx(&params, &trail, None);
        let first = update_agent(3, &a, &[], &c);
        let second = update_agent(3, &a, &[], &c);
        assert_eq!(first, second);
        assert!((first.heading.abs() - 0.1).abs() < 1e-5);
    }

    #[test]
    fn tie_break_seeds_do_not_collide_across_index_and_tick() {
        assert_ne!(tie_break_seed(7, 4, 10), tie_break_seed(7, 5, 9));
        assert_ne!(tie_break_seed(7, 4, 10), tie_break_seed(7, 4, 11));
    }

    #[test]
    fn inertia_slows_turning() {
        let params = SimParams {
            inertia: 0.5,
            pointer_strength: 100.0,
            gate_on_press: false,
            falloff: swarm_common::FalloffLaw::InverseLinear,
            pointer_softening: 1.0,
            ..still_params()
        };
        let trail = TrailField::new(100, 100, TrailFormat::R).expect("trail");
        let mut c = ctx(&params, &trail, None);
        // Pointer straight above: desired heading close to +90 degrees.
        c.pointer = PointerState { position: Vec2::new(50.0, 90.0), pressed: false };
        let out = update_agent(0, &agent(50.0, 50.0, 0.0, 1.0), &[], &c);
        let desired = vec_to_angle(Vec2::new(1.0, 0.0) + Vec2::new(0.0, 100.0 / 40.0));
        assert!((out.heading - desired * 0.5).abs() < 1e-4);
    }

    #[test]
    fn collision_pushes_overlapping_agents_apart() {
        let params = SimParams {
            collision: true,
            collision_radius: 10.0,
            restitution: 1.0,
            ..still_params()
        };
        let trail = TrailField::new(100, 100, TrailFormat::R).expect("trail");
        let agents = vec![agent(50.0, 50.0, PI / 2.0, 1.0), agent(52.0, 50.0, PI / 2.0, 1.0)];
        let mut grid: SpatialHashGrid = SpatialHashGrid::new();
        grid.rebuild_if_needed(&params, 100.0, 100.0, agents.len()).expect("grid");
        grid.reset();
        grid.build(&agents);
        let out = update_agent(0, &agents[0], &agents, &ctx(&params, &trail, Some(&grid)));
        // Agent 0 is left of agent 1, so it veers towards -x.
        assert!(out.heading > PI / 2.0, "heading {}", out.heading);
    }

    #[test]
    fn cohesion_pulls_towards_the_group() {
        let params = SimParams {
            flocking: true,
            flocking_radius: 30.0,
            alignment_weight: 0.0,
            separation_weight: 0.0,
            cohesion_weight: 1.0,
            ..still_params()
        };
        let trail = TrailField::new(100, 100, TrailFormat::R).expect("trail");
        let agents = vec![
            agent(50.0, 50.0, 0.0, 1.0),
            agent(50.0, 60.0, 0.0, 1.0),
            agent(52.0, 62.0, 0.0, 1.0),
        ];
        let mut grid: SpatialHashGrid = SpatialHashGrid::new();
        grid.rebuild_if_needed(&params, 100.0, 100.0, agents.len()).expect("grid");
        grid.reset();
        grid.build(&agents);
        let out = update_agent(0, &agents[0], &agents, &ctx(&params, &trail, Some(&grid)));
        assert!(out.heading > 0.0, "heading {}", out.heading);
    }

    #[test]
    fn deposit_lands_on_the_new_position() {
        let params = SimParams { deposit_amount: 2.0, ..still_params() };
        let mut trail = TrailField::new(100, 100, TrailFormat::R).expect("trail");
        let out = update_agent(0, &agent(10.0, 10.0, 0.0, 10.0), &[], &ctx(&params, &trail, None));
        assert_eq!(trail.sample(0, out.x, out.y, BoundaryMode::Bounce), 0.0);
        publish(&mut trail);
        assert_eq!(trail.sample(0, out.x, out.y, BoundaryMode::Bounce), 2.0);
    }

    #[test]
    fn sensing_ignores_deposits_made_in_the_same_pass() {
        let params = SimParams { deposit_amount: 10.0, ..sensing_params() };
        // `depositor` ends its step on the left sensor texel of `sensor`.
        let depositor = agent(57.5, 57.5, 0.0, 0.0);
        let sensor = agent(50.0, 50.0, 0.0, 1.0);

        let depositor_first = {
            let trail = TrailField::new(100, 100, TrailFormat::R).expect("trail");
            let c = ctx(&params, &trail, None);
            update_agent(0, &depositor, &[], &c);
            update_agent(1, &sensor, &[], &c)
        };
        let sensor_first = {
            let trail = TrailField::new(100, 100, TrailFormat::R).expect("trail");
            let c = ctx(&params, &trail, None);
            let out = update_agent(1, &sensor, &[], &c);
            update_agent(0, &depositor, &[], &c);
            out
        };
        assert_eq!(depositor_first, sensor_first);
    }
}
