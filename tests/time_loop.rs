use dpmsim::config::{BroadPhaseKind, SimulationConfig};
use dpmsim::core::vector::{self, Vec3};
use dpmsim::core::{Boundary, Dimension, InfiniteWall, Particle, Simulation, Species};
use dpmsim::error::Result;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn quiet(config: SimulationConfig) -> SimulationConfig {
    SimulationConfig {
        log_interval: 0,
        ..config
    }
}

/// Wrap into [0, 1).
fn wrap(x: f64) -> f64 {
    x - x.floor()
}

/// Distance between two coordinates on the unit circle.
fn periodic_gap(a: f64, b: f64) -> f64 {
    let d = a - b;
    (d - d.round()).abs()
}

#[test]
fn ballistic_motion_in_a_periodic_square() -> Result<()> {
    let config = quiet(SimulationConfig {
        dimension: Dimension::Two,
        time_step: 1e-3,
        domain_max: [1.0, 1.0, 0.0],
        ..SimulationConfig::default()
    });
    let mut sim = Simulation::new(config)?;
    sim.add_species(Species::new(1.0)?);
    sim.add_boundary(Boundary::periodic([1.0, 0.0, 0.0], 0.0, 1.0)?);
    sim.add_boundary(Boundary::periodic([0.0, 1.0, 0.0], 0.0, 1.0)?);

    // one particle per row; all rows drift together in y, so nothing touches
    let mut initial: Vec<(Vec3, Vec3)> = Vec::new();
    for k in 0..14 {
        let x = [0.03 + 0.07 * k as f64, 0.05 + 0.07 * k as f64, 0.0];
        let v = [-1.3 + 0.2 * k as f64, 0.35, 0.0];
        sim.add_particle(Particle::new(x, v, 0.01)?)?;
        initial.push((x, v));
    }

    let t_end = 2.0;
    sim.advance_to(t_end)?;
    assert_eq!(sim.step_count(), 2000);
    assert_eq!(sim.num_particles(), 14);

    for (p, (x0, v)) in sim.real_particles().zip(&initial) {
        for k in 0..2 {
            let expected = wrap(x0[k] + v[k] * sim.time());
            let gap = periodic_gap(p.position[k], expected);
            assert!(gap < 1e-10, "particle {} axis {k}: {} vs {expected}", p.id(), p.position[k]);
            assert!((0.0..=1.0).contains(&p.position[k]));
        }
        assert_eq!(p.velocity, *v);
    }
    assert_eq!(sim.interactions().len(), 0);
    Ok(())
}

/// Fourteen discs in a doubly periodic unit square: head-on pairs across
/// the x seam, the y seam and the corner, plus a loose cluster in the middle.
fn seam_collisions(kind: BroadPhaseKind) -> Result<Simulation> {
    let config = quiet(SimulationConfig {
        dimension: Dimension::Two,
        time_step: 1e-4,
        domain_max: [1.0, 1.0, 0.0],
        broad_phase: kind,
        ..SimulationConfig::default()
    });
    let radius = 0.05;
    let mut sim = Simulation::new(config)?;
    let mut species = Species::new(1.0)?;
    let mass = species.mass_of(radius, Dimension::Two);
    species.set_collision_time_and_restitution(0.005, 0.8, mass)?;
    sim.add_species(species);
    sim.add_boundary(Boundary::periodic([1.0, 0.0, 0.0], 0.0, 1.0)?);
    sim.add_boundary(Boundary::periodic([0.0, 1.0, 0.0], 0.0, 1.0)?);

    let mut setup: Vec<(Vec3, Vec3)> = vec![
        ([0.06, 0.2, 0.0], [-0.5, 0.0, 0.0]),
        ([0.94, 0.2, 0.0], [0.5, 0.0, 0.0]),
        ([0.3, 0.06, 0.0], [0.0, -0.5, 0.0]),
        ([0.3, 0.94, 0.0], [0.0, 0.5, 0.0]),
        ([0.045, 0.045, 0.0], [-0.3, -0.3, 0.0]),
        ([0.955, 0.955, 0.0], [0.3, 0.3, 0.0]),
    ];
    for k in 0..8 {
        let x = [0.45 + 0.25 * (k % 2) as f64, 0.3 + 0.17 * (k / 2) as f64, 0.0];
        let angle = 0.9 * k as f64;
        setup.push((x, [0.4 * angle.cos(), 0.4 * angle.sin(), 0.0]));
    }
    for (x, v) in setup {
        sim.add_particle(Particle::new(x, v, radius)?)?;
    }
    assert_eq!(sim.num_particles(), 14);
    Ok(sim)
}

#[test]
fn collisions_across_both_seams_match_all_pairs() -> Result<()> {
    init_logging();
    let mut grid = seam_collisions(BroadPhaseKind::HGrid)?;
    let mut brute = seam_collisions(BroadPhaseKind::AllPairs)?;
    let p0 = grid.momentum();

    let (mut seam_steps, mut corner_steps) = (0usize, 0usize);
    for _ in 0..4000 {
        grid.step()?;
        brute.step()?;
        for contact in grid.interactions().iter().filter(|c| c.overlap > 0.0) {
            let (a, b) = (&grid.particles[contact.p], &grid.particles[contact.i]);
            let d = vector::sub(a.position, b.position);
            if d[0].abs() > 0.5 || d[1].abs() > 0.5 {
                seam_steps += 1;
            }
            if d[0].abs() > 0.5 && d[1].abs() > 0.5 {
                corner_steps += 1;
            }
        }
    }
    assert!(seam_steps > 0, "no contact through a seam");
    assert!(corner_steps > 0, "no contact through the corner");
    assert!(vector::norm(vector::sub(grid.momentum(), p0)) < 1e-10);

    assert_eq!(grid.num_particles(), 14);
    for (a, b) in grid.real_particles().zip(brute.real_particles()) {
        for k in 0..2 {
            let gap = periodic_gap(a.position[k], b.position[k]);
            assert!(
                gap < 1e-10,
                "particle {} axis {k}: {} vs {}",
                a.id(),
                a.position[k],
                b.position[k]
            );
            assert!((a.velocity[k] - b.velocity[k]).abs() < 1e-10, "particle {} axis {k}", a.id());
        }
    }
    Ok(())
}

fn dissipative_box(kind: BroadPhaseKind, seed: u64) -> Result<Simulation> {
    let config = quiet(SimulationConfig {
        time_step: 1e-4,
        domain_max: [2.0; 3],
        broad_phase: kind,
        ..SimulationConfig::default()
    });
    let mut species = Species::new(1.0)?;
    let mass = species.mass_of(0.1, Dimension::Three);
    species.set_collision_time_and_restitution(0.005, 0.8, mass)?;
    species.set_sliding(0.4, None, 0.0)?;
    let mut sim = Simulation::with_random_particles(config, species, 80, (0.05, 0.15), Some(seed))?;
    for (axis, normal) in [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]
        .into_iter()
        .enumerate()
    {
        sim.add_boundary(Boundary::periodic(normal, 0.0, 2.0)?);
        assert_eq!(sim.boundaries.len(), axis + 1);
    }
    Ok(sim)
}

#[test]
fn periodic_collisions_conserve_momentum() -> Result<()> {
    init_logging();
    let mut sim = dissipative_box(BroadPhaseKind::HGrid, 2024)?;
    let p0 = sim.momentum();
    let e0 = sim.kinetic_energy();
    sim.run(3000)?;
    let p1 = sim.momentum();
    assert!(vector::norm(vector::sub(p0, p1)) < 1e-10, "{p0:?} -> {p1:?}");
    assert!(sim.kinetic_energy() <= e0 * (1.0 + 1e-6));
    assert!(sim.statistics().ghosts > 0);
    Ok(())
}

#[test]
fn broad_phases_produce_the_same_trajectories() -> Result<()> {
    let mut grid = dissipative_box(BroadPhaseKind::HGrid, 7)?;
    let mut brute = dissipative_box(BroadPhaseKind::AllPairs, 7)?;
    for _ in 0..400 {
        grid.step()?;
        brute.step()?;
    }
    assert_eq!(grid.num_particles(), brute.num_particles());
    for (a, b) in grid.positions().iter().zip(brute.positions()) {
        assert!(vector::norm(vector::sub(*a, b)) < 1e-8, "{a:?} vs {b:?}");
    }
    assert_eq!(grid.interactions().len(), brute.interactions().len());
    Ok(())
}

#[test]
fn wall_bounce_matches_restitution() -> Result<()> {
    let config = quiet(SimulationConfig {
        time_step: 2e-5,
        domain_max: [1.0; 3],
        ..SimulationConfig::default()
    });
    let mut sim = Simulation::new(config)?;
    let radius = 0.1;
    let mut species = Species::new(1.0)?;
    let mass = species.mass_of(radius, Dimension::Three);
    // a wall behaves like a partner of infinite mass, so the pair mass is 2m
    species.set_collision_time_and_restitution(0.004, 0.6, 2.0 * mass)?;
    sim.add_species(species);
    sim.add_wall(InfiniteWall::new([0.0, 0.0, -1.0], [0.0; 3])?)?;
    sim.add_particle(Particle::new([0.5, 0.5, 0.15], [0.0, 0.0, -1.0], radius)?)?;

    sim.advance_to(0.1)?;
    let v = sim.particles[0].velocity;
    assert!((v[2] - 0.6).abs() < 0.01, "rebound speed {}", v[2]);
    assert!(v[0].abs() < 1e-12 && v[1].abs() < 1e-12);
    assert_eq!(sim.statistics().wall_contacts, 0);
    Ok(())
}

#[test]
fn maser_feeds_copies_into_the_domain() -> Result<()> {
    init_logging();
    let config = quiet(SimulationConfig {
        dimension: Dimension::Two,
        time_step: 1e-3,
        domain_max: [10.0, 1.0, 0.0],
        ..SimulationConfig::default()
    });
    let mut sim = Simulation::new(config)?;
    let mut species = Species::new(1.0)?;
    species.set_stiffness(1e3)?;
    sim.add_species(species);
    for x in [0.2, 0.5, 0.8] {
        sim.add_particle(Particle::new([x, 0.5, 0.0], [1.0, 0.0, 0.0], 0.05)?)?;
    }
    sim.add_boundary(Boundary::maser([1.0, 0.0, 0.0], 0.0, 1.0)?);
    sim.activate_maser(0)?;
    assert_eq!(sim.species.len(), 2);

    sim.advance_to(1.0)?;
    assert_eq!(sim.num_particles(), 6);
    let mut maser: Vec<f64> = Vec::new();
    let mut emitted: Vec<f64> = Vec::new();
    for p in sim.real_particles() {
        match p.species {
            1 => maser.push(p.position[0]),
            0 => emitted.push(p.position[0]),
            s => panic!("unexpected species {s}"),
        }
        assert!((p.velocity[0] - 1.0).abs() < 1e-12, "particle {} was pushed", p.id());
    }
    emitted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    assert_eq!(maser.len(), 3);
    for (x, expected) in emitted.iter().zip([1.2, 1.5, 1.8]) {
        assert!((x - expected).abs() < 1e-9, "emitted copy at {x}, expected {expected}");
    }
    assert!(maser.iter().all(|x| (0.0..=1.0).contains(x)));

    sim.close_maser(0)?;
    assert!(sim.real_particles().all(|p| p.species == 0));
    Ok(())
}

#[test]
fn removing_particles_mid_run() -> Result<()> {
    init_logging();
    let mut sim = dissipative_box(BroadPhaseKind::HGrid, 99)?;
    sim.run(200)?;
    let before = sim.num_particles();
    for _ in 0..10 {
        let removed = sim.remove_particle(3).unwrap();
        assert!(!removed.is_ghost());
    }
    assert_eq!(sim.num_particles(), before - 10);
    let n = sim.particles.len();
    for i in sim.interactions().iter() {
        assert!(i.p < n && i.i < n);
        assert!(!sim.particles[i.p].is_ghost() && !sim.particles[i.i].is_ghost());
    }
    sim.run(200)?;
    assert_eq!(sim.num_particles(), before - 10);
    Ok(())
}
