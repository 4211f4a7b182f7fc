//! Static scene geometry and line-of-sight occlusion.

use nalgebra::Vector3;

/// Axis-aligned building volume.
#[derive(Clone, Copy, Debug)]
pub struct Building {
    min: Vector3<f64>,
    max: Vector3<f64>,
}

/// Static geometry the radar and optical paths must clear.
#[derive(Clone, Debug, Default)]
pub struct Environment {
    buildings: Vec<Building>,
}

impl Environment {
    /// Add a building by centre and full extents.
    pub fn add_building(&mut self, center: Vector3<f64>, size: Vector3<f64>) {
        let half = size / 2.0;
        self.buildings.push(Building {
            min: center - half,
            max: center + half,
        });
    }

    /// True when the segment `from → to` passes through any building.
    /// Slab test against each axis-aligned box.
    pub fn check_occlusion(&self, from: Vector3<f64>, to: Vector3<f64>) -> bool {
        let dir = to - from;
        let len = dir.norm();
        if len < 1e-9 {
            return false;
        }

        self.buildings.iter().any(|b| {
            let mut t_min: f64 = 0.0;
            let mut t_max: f64 = 1.0;
            for axis in 0..3 {
                let d = dir[axis];
                if d.abs() < 1e-12 {
                    if from[axis] < b.min[axis] || from[axis] > b.max[axis] {
                        return false;
                    }
                    continue;
                }
                let inv = 1.0 / d;
                let (t0, t1) = {
                    let a = (b.min[axis] - from[axis]) * inv;
                    let c = (b.max[axis] - from[axis]) * inv;
                    if a < c {
                        (a, c)
                    } else {
                        (c, a)
                    }
                };
                t_min = t_min.max(t0);
                t_max = t_max.min(t1);
                if t_min > t_max {
                    return false;
                }
            }
            true
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene() -> Environment {
        let mut env = Environment::default();
        // The warehouse obstacle: 60x30x20 centred at (0, 15, 200).
        env.add_building(Vector3::new(0.0, 15.0, 200.0), Vector3::new(60.0, 30.0, 20.0));
        env
    }

    #[test]
    fn target_behind_building_is_occluded() {
        let env = scene();
        assert!(env.check_occlusion(
            Vector3::zeros(),
            Vector3::new(0.0, 10.0, 400.0),
        ));
    }

    #[test]
    fn target_above_building_is_visible() {
        let env = scene();
        assert!(!env.check_occlusion(
            Vector3::zeros(),
            Vector3::new(0.0, 200.0, 400.0),
        ));
    }

    #[test]
    fn target_beside_building_is_visible() {
        let env = scene();
        assert!(!env.check_occlusion(
            Vector3::zeros(),
            Vector3::new(300.0, 10.0, 400.0),
        ));
    }

    #[test]
    fn target_in_front_of_building_is_visible() {
        let env = scene();
        assert!(!env.check_occlusion(
            Vector3::zeros(),
            Vector3::new(0.0, 10.0, 150.0),
        ));
    }
}
