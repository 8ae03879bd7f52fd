use swarm_common::{FalloffLaw, PointerMode, SimParams, Vec2};

/// Pointer state sampled by the input layer for one tick, in field units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerState {
    pub position: Vec2,
    pub pressed: bool,
}

/// Force magnitude at distance `r` for the configured law.
///
/// The inverse laws use `max(r, softening)` so the magnitude stays finite at the pointer.
#[inline]
pub fn falloff(law: FalloffLaw, r: f32, params: &SimParams) -> f32 {
    let strength = params.pointer_strength;
    let soft = r.max(params.pointer_softening);
    match law {
        FalloffLaw::InverseLinear => strength / soft,
        FalloffLaw::InverseSquare => strength / (soft * soft),
        FalloffLaw::InverseCube => strength / (soft * soft * soft),
        FalloffLaw::Gaussian => {
            let sigma = params.pointer_sigma;
            strength * (-(r * r) / (2.0 * sigma * sigma)).exp()
        }
        FalloffLaw::Oscillatory => strength * (params.pointer_frequency * r).cos(),
    }
}

/// Whether the pointer acts this tick. Attract and repel follow the press when
/// `gate_on_press` is set; ring and vortex are always on.
#[inline]
pub fn is_active(mode: PointerMode, pressed: bool, params: &SimParams) -> bool {
    match mode {
        PointerMode::Attract | PointerMode::Repel => pressed || !params.gate_on_press,
        PointerMode::Ring | PointerMode::Vortex => true,
    }
}

/// Steering vector exerted by the pointer on an agent at `position`.
#[inline]
pub fn pointer_force(position: Vec2, pointer: &PointerState, params: &SimParams) -> Vec2 {
    if params.pointer_strength <= 0.0 || !is_active(params.pointer_mode, pointer.pressed, params) {
        return Vec2::zero();
    }
    let offset = pointer.position - position;
    let r = offset.length();
    if params.pointer_max_radius > 0.0 && r > params.pointer_max_radius {
        return Vec2::zero();
    }
    // Unit vector towards the pointer; zero when sitting on it.
    let toward = offset.normalize_or_zero();

    match params.pointer_mode {
        PointerMode::Attract => toward * falloff(params.falloff, r, params),
        PointerMode::Repel => -toward * falloff(params.falloff, r, params),
        PointerMode::Ring => {
            let gap = r - params.ring_radius;
            let magnitude = falloff(params.falloff, gap.abs(), params);
            // Outside the ring: pulled in. Inside the core: pushed out.
            if gap >= 0.0 { toward * magnitude } else { -toward * magnitude }
        }
        PointerMode::Vortex => (toward * falloff(params.falloff, r, params)).perp(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(mode: PointerMode, law: FalloffLaw) -> SimParams {
        SimParams {
            pointer_mode: mode,
            falloff: law,
            pointer_strength: 3.0,
            pointer_sigma: 10.0,
            pointer_softening: 1.0,
            gate_on_press: true,
            ..SimParams::default()
        }
    }

    fn pressed_at(x: f32, y: f32) -> PointerState {
        PointerState { position: Vec2::new(x, y), pressed: true }
    }

    #[test]
    fn gaussian_at_sigma_is_strength_times_exp_minus_half() {
        let p = params(PointerMode::Attract, FalloffLaw::Gaussian);
        let f = pointer_force(Vec2::new(10.0, 0.0), &pressed_at(0.0, 0.0), &p);
        let expected = 3.0 * (-0.5f32).exp();
        assert!((f.length() - expected).abs() < 1e-5, "{} vs {}", f.length(), expected);
        assert!(f.x < 0.0, "attract points at the pointer");
    }

    #[test]
    fn inverse_laws_fall_off_with_increasing_power() {
        let p = params(PointerMode::Attract, FalloffLaw::InverseLinear);
        assert!((falloff(FalloffLaw::InverseLinear, 4.0, &p) - 0.75).abs() < 1e-6);
        assert!((falloff(FalloffLaw::InverseSquare, 4.0, &p) - 3.0 / 16.0).abs() < 1e-6);
        assert!((falloff(FalloffLaw::InverseCube, 4.0, &p) - 3.0 / 64.0).abs() < 1e-6);
        // Softened at the pointer.
        assert!(falloff(FalloffLaw::InverseCube, 0.0, &p).is_finite());
    }

    #[test]
    fn oscillatory_changes_sign() {
        let p = SimParams { pointer_frequency: 0.5, ..params(PointerMode::Attract, FalloffLaw::Oscillatory) };
        assert!(falloff(FalloffLaw::Oscillatory, 0.0, &p) > 0.0);
        assert!(falloff(FalloffLaw::Oscillatory, std::f32::consts::PI * 2.0 / 0.5 / 2.0, &p) < 0.0);
    }

    #[test]
    fn repel_mirrors_attract() {
        let at = pressed_at(0.0, 0.0);
        let pos = Vec2::new(3.0, 4.0);
        let a = pointer_force(pos, &at, &params(PointerMode::Attract, FalloffLaw::InverseSquare));
        let r = pointer_force(pos, &at, &params(PointerMode::Repel, FalloffLaw::InverseSquare));
        assert!((a + r).length() < 1e-6);
    }

    #[test]
    fn vortex_is_tangential() {
        let pos = Vec2::new(5.0, 0.0);
        let f = pointer_force(pos, &pressed_at(0.0, 0.0), &params(PointerMode::Vortex, FalloffLaw::InverseLinear));
        assert!(f.length() > 0.0);
        assert!(f.dot(pos).abs() < 1e-6);
    }

    #[test]
    fn ring_pushes_core_out_and_pulls_band_in() {
        let p = SimParams { ring_radius: 20.0, ..params(PointerMode::Ring, FalloffLaw::Gaussian) };
        let center = pressed_at(0.0, 0.0);
        let inside = pointer_force(Vec2::new(5.0, 0.0), &center, &p);
        let outside = pointer_force(Vec2::new(35.0, 0.0), &center, &p);
        assert!(inside.x > 0.0);
        assert!(outside.x < 0.0);
    }

    #[test]
    fn press_gating() {
        let p = params(PointerMode::Attract, FalloffLaw::InverseLinear);
        let released = PointerState { position: Vec2::zero(), pressed: false };
        assert_eq!(pointer_force(Vec2::new(5.0, 0.0), &released, &p), Vec2::zero());

        let ungated = SimParams { gate_on_press: false, ..p.clone() };
        assert!(pointer_force(Vec2::new(5.0, 0.0), &released, &ungated).length() > 0.0);

        let vortex = params(PointerMode::Vortex, FalloffLaw::InverseLinear);
        assert!(pointer_force(Vec2::new(5.0, 0.0), &released, &vortex).length() > 0.0);
    }

    #[test]
    fn cutoff_radius_limits_reach() {
        let p = SimParams { pointer_max_radius: 10.0, ..params(PointerMode::Attract, FalloffLaw::InverseLinear) };
        assert_eq!(pointer_force(Vec2::new(50.0, 0.0), &pressed_at(0.0, 0.0), &p), Vec2::zero());
    }
}
