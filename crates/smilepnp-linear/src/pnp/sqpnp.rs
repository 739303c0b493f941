//! SQPnP: globally optimal PnP by sequential quadratic programming.
//!
//! The squared algebraic reprojection error is a quadratic form `rᵀ Ω r` in
//! the row-major rotation 9-vector `r` once the translation is eliminated
//! (`t = P r`). The solver runs SQP on SO(3) from the rotations nearest to
//! the eigenvectors of `Ω` with the smallest eigenvalues and keeps every
//! positive-depth minimum.
//!
//! Reference: G. Terzakis and M. Lourakis, "A Consistently Fast and Globally
//! Optimal Solution to the Perspective-n-Point Problem", ECCV 2020.

use super::{check_inputs, normalized_rays, PnpError};
use crate::math::{nearest_rotation, orthogonality_error};
use nalgebra::{SMatrix, SVector};
use serde::{Deserialize, Serialize};
use smilepnp_core::{CameraModel, Mat3, Pt2, Pt3, Real, Vec2, Vec3};

type Vec6 = SVector<Real, 6>;
type Vec9 = SVector<Real, 9>;
type Mat6 = SMatrix<Real, 6, 6>;
type Mat9 = SMatrix<Real, 9, 9>;
type Mat3x9 = SMatrix<Real, 3, 9>;
type Mat9x3 = SMatrix<Real, 9, 3>;
type Mat9x6 = SMatrix<Real, 9, 6>;

pub const SQPNP_MIN_POINTS: usize = 3;

/// Tolerances of the SQPnP solver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqpnpOptions {
    /// Eigenvalues of `Ω` below this count as null directions.
    pub rank_tolerance: Real,
    /// SQP stops once the squared step norm drops below this.
    pub sqp_squared_tolerance: Real,
    /// Determinant above which an SQP result is re-projected onto SO(3).
    pub sqp_det_threshold: Real,
    pub sqp_max_iterations: usize,
    /// Eigenvectors this close to a rotation skip SQP.
    pub orthogonality_squared_error_threshold: Real,
    pub equal_vectors_squared_diff: Real,
    pub equal_squared_errors_diff: Real,
}

impl Default for SqpnpOptions {
    fn default() -> Self {
        Self {
            rank_tolerance: 1e-7,
            sqp_squared_tolerance: 1e-10,
            sqp_det_threshold: 1.001,
            sqp_max_iterations: 15,
            orthogonality_squared_error_threshold: 1e-8,
            equal_vectors_squared_diff: 1e-10,
            equal_squared_errors_diff: 1e-6,
        }
    }
}

/// A candidate pose returned by [`sqpnp`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SqpnpSolution {
    /// World-to-camera rotation.
    pub rotation: Mat3,
    pub translation: Vec3,
    /// Algebraic error `rᵀ Ω r` on normalized coordinates.
    pub sq_error: Real,
    pub num_iterations: usize,
}

/// Solve PnP with SQPnP.
///
/// Returns every distinct positive-depth solution whose error ties the
/// minimum, sorted by ascending algebraic error.
pub fn sqpnp(
    world: &[Pt3],
    image: &[Pt2],
    camera: &CameraModel,
    opts: &SqpnpOptions,
) -> Result<Vec<SqpnpSolution>, PnpError> {
    check_inputs(world, image, SQPNP_MIN_POINTS)?;
    let rays = normalized_rays(image, camera);
    let solver = Solver::new(world, &rays, opts)?;
    let mut solutions = solver.solve()?;
    solutions.sort_by(|a, b| a.sq_error.total_cmp(&b.sq_error));
    log::debug!(
        "sqpnp: {} solution(s), best algebraic error {:.3e}",
        solutions.len(),
        solutions[0].sq_error
    );
    Ok(solutions)
}

struct Solver<'a> {
    world: &'a [Pt3],
    opts: &'a SqpnpOptions,
    omega: Mat9,
    /// `t = p * r`.
    p: Mat3x9,
    /// Eigenvalues of `Ω`, descending, and matching eigenvectors.
    s: [Real; 9],
    u: [Vec9; 9],
    mean: Vec3,
}

impl<'a> Solver<'a> {
    fn new(world: &'a [Pt3], rays: &[Vec2], opts: &'a SqpnpOptions) -> Result<Self, PnpError> {
        let (omega, p) = omega_matrix(world, rays)?;

        let eig = omega.symmetric_eigen();
        let mut order: [usize; 9] = std::array::from_fn(|i| i);
        order.sort_by(|&a, &b| eig.eigenvalues[b].total_cmp(&eig.eigenvalues[a]));
        let s = order.map(|i| eig.eigenvalues[i]);
        let u = order.map(|i| eig.eigenvectors.column(i).into_owned());

        let mean = world.iter().fold(Vec3::zeros(), |acc, p| acc + p.coords) / world.len() as Real;
        Ok(Self {
            world,
            opts,
            omega,
            p,
            s,
            u,
            mean,
        })
    }

    fn solve(&self) -> Result<Vec<SqpnpSolution>, PnpError> {
        let num_null = self
            .s
            .iter()
            .rev()
            .take_while(|&&v| v < self.opts.rank_tolerance)
            .count();
        if num_null > 6 {
            return Err(PnpError::RankDeficient(num_null));
        }

        let mut best = Best::default();
        let num_eigen_points = num_null.max(1);
        let sqrt3 = (3.0_f64).sqrt();

        for e in &self.u[9 - num_eigen_points..] {
            let e = e * sqrt3;
            let m = mat_from_vec9(&e);
            if orthogonality_error(&m) < self.opts.orthogonality_squared_error_threshold {
                let r = e * m.determinant();
                self.handle(self.candidate(r, 0), &mut best);
            } else {
                self.run_from(&e, &mut best);
                self.run_from(&(-e), &mut best);
            }
        }

        let mut c = 1;
        while 9 - num_eigen_points > c {
            let index = 9 - num_eigen_points - c;
            if best.min_sq_error <= 3.0 * self.s[index] {
                break;
            }
            let e = self.u[index];
            self.run_from(&e, &mut best);
            self.run_from(&(-e), &mut best);
            c += 1;
        }

        if best.solutions.is_empty() {
            return Err(PnpError::NoSolution);
        }
        Ok(best.solutions)
    }

    fn run_from(&self, e: &Vec9, best: &mut Best) {
        let Some(start) = nearest_rotation(&mat_from_vec9(e)) else {
            return;
        };
        if let Some(solution) = self.run_sqp(vec9_from_mat(&start)) {
            self.handle(solution, best);
        }
    }

    fn candidate(&self, r: Vec9, num_iterations: usize) -> SqpnpSolution {
        SqpnpSolution {
            rotation: mat_from_vec9(&r),
            translation: self.p * r,
            sq_error: (r.transpose() * self.omega * r)[(0, 0)],
            num_iterations,
        }
    }

    fn run_sqp(&self, r0: Vec9) -> Option<SqpnpSolution> {
        let mut r = r0;
        let mut delta_sq = Real::INFINITY;
        let mut step = 0;
        while delta_sq > self.opts.sqp_squared_tolerance && step < self.opts.sqp_max_iterations {
            let delta = sqp_step(&r, &self.omega)?;
            r += delta;
            delta_sq = delta.norm_squared();
            step += 1;
        }

        let mut m = mat_from_vec9(&r);
        let mut det = m.determinant();
        if det < 0.0 {
            m = -m;
            det = -det;
        }
        if det > self.opts.sqp_det_threshold {
            m = nearest_rotation(&m)?;
        }
        Some(self.candidate(vec9_from_mat(&m), step))
    }

    fn depth(&self, solution: &SqpnpSolution, p: &Vec3) -> Real {
        solution.rotation.row(2).transpose().dot(p) + solution.translation.z
    }

    fn in_front(&self, solution: &SqpnpSolution) -> bool {
        if self.depth(solution, &self.mean) > 0.0 {
            return true;
        }
        let positive = self
            .world
            .iter()
            .filter(|p| self.depth(solution, &p.coords) > 0.0)
            .count();
        positive >= self.world.len() - positive
    }

    fn handle(&self, solution: SqpnpSolution, best: &mut Best) {
        if !self.in_front(&solution) {
            return;
        }

        let opts = self.opts;
        if (best.min_sq_error - solution.sq_error).abs() > opts.equal_squared_errors_diff {
            if best.min_sq_error > solution.sq_error {
                best.min_sq_error = solution.sq_error;
                best.solutions.clear();
                best.solutions.push(solution);
            }
            return;
        }

        let duplicate = best.solutions.iter_mut().find(|s| {
            (s.rotation - solution.rotation).norm_squared() < opts.equal_vectors_squared_diff
        });
        match duplicate {
            Some(existing) => {
                if existing.sq_error > solution.sq_error {
                    *existing = solution;
                }
            }
            None => best.solutions.push(solution),
        }
        if best.min_sq_error > solution.sq_error {
            best.min_sq_error = solution.sq_error;
        }
    }
}

struct Best {
    min_sq_error: Real,
    solutions: Vec<SqpnpSolution>,
}

impl Default for Best {
    fn default() -> Self {
        Self {
            min_sq_error: Real::INFINITY,
            solutions: Vec::new(),
        }
    }
}

/// Build `Ω` and `P` from world points and normalized image points.
///
/// Per point, `Q_i = A_iᵀ A_i` with `A_i = [[1, 0, -x], [0, 1, -y]]` and
/// `B_i` maps `r` to `R X_i`, so the residual is `A_i (B_i r + t)`.
fn omega_matrix(world: &[Pt3], rays: &[Vec2]) -> Result<(Mat9, Mat3x9), PnpError> {
    let mut omega = Mat9::zeros();
    let mut q_sum = Mat3::zeros();
    let mut qa = Mat3x9::zeros();

    for (pw, n) in world.iter().zip(rays) {
        let q = Mat3::new(
            1.0,
            0.0,
            -n.x,
            0.0,
            1.0,
            -n.y,
            -n.x,
            -n.y,
            n.x * n.x + n.y * n.y,
        );
        let mut b = Mat3x9::zeros();
        for row in 0..3 {
            b.fixed_view_mut::<1, 3>(row, 3 * row)
                .copy_from(&pw.coords.transpose());
        }
        let qb = q * b;
        q_sum += q;
        qa += qb;
        omega += b.transpose() * qb;
    }

    let scale = q_sum.norm();
    if q_sum.determinant().abs() <= 1e-12 * scale * scale * scale {
        return Err(PnpError::Degenerate("image points coincide"));
    }
    let q_inv = q_sum
        .try_inverse()
        .ok_or(PnpError::Degenerate("image points coincide"))?;
    let p = -(q_inv * qa);
    omega += qa.transpose() * p;
    omega = (omega + omega.transpose()) * 0.5;
    Ok((omega, p))
}

/// One SQP step from `r` towards the minimum of `rᵀ Ω r` on SO(3).
fn sqp_step(r: &Vec9, omega: &Mat9) -> Option<Vec9> {
    let a = r.fixed_rows::<3>(0).into_owned();
    let b = r.fixed_rows::<3>(3).into_owned();
    let c = r.fixed_rows::<3>(6).into_owned();

    // Jacobian of [|a|²-1, |b|²-1, |c|²-1, a·b, b·c, a·c].
    let mut jt = Mat9x6::zeros();
    jt.fixed_view_mut::<3, 1>(0, 0).copy_from(&(a * 2.0));
    jt.fixed_view_mut::<3, 1>(3, 1).copy_from(&(b * 2.0));
    jt.fixed_view_mut::<3, 1>(6, 2).copy_from(&(c * 2.0));
    jt.fixed_view_mut::<3, 1>(0, 3).copy_from(&b);
    jt.fixed_view_mut::<3, 1>(3, 3).copy_from(&a);
    jt.fixed_view_mut::<3, 1>(3, 4).copy_from(&c);
    jt.fixed_view_mut::<3, 1>(6, 4).copy_from(&b);
    jt.fixed_view_mut::<3, 1>(0, 5).copy_from(&c);
    jt.fixed_view_mut::<3, 1>(6, 5).copy_from(&a);

    let g = Vec6::new(
        1.0 - a.norm_squared(),
        1.0 - b.norm_squared(),
        1.0 - c.norm_squared(),
        -a.dot(&b),
        -b.dot(&c),
        -a.dot(&c),
    );

    // Jᵀ = H K with orthonormal H, so J H = Kᵀ is lower triangular.
    let qr = jt.qr();
    let h: Mat9x6 = qr.q();
    let k: Mat6 = qr.r();
    let x = k.transpose().solve_lower_triangular(&g)?;
    if x.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let delta0 = h * x;

    let null_space = null_space_of(&h);
    let nt_omega = null_space.transpose() * omega;
    let w = nt_omega * null_space;
    let rhs = -(nt_omega * (delta0 + r));
    let y = w
        .cholesky()
        .map(|chol| chol.solve(&rhs))
        .or_else(|| w.pseudo_inverse(1e-12).ok().map(|w_inv| w_inv * rhs))?;

    Some(delta0 + null_space * y)
}

/// Orthonormal basis of the complement of `h`'s column space.
fn null_space_of(h: &Mat9x6) -> Mat9x3 {
    let projector = Mat9::identity() - h * h.transpose();
    let eig = projector.symmetric_eigen();
    let mut order: [usize; 9] = std::array::from_fn(|i| i);
    order.sort_by(|&a, &b| eig.eigenvalues[b].total_cmp(&eig.eigenvalues[a]));
    Mat9x3::from_columns(&[
        eig.eigenvectors.column(order[0]).into_owned(),
        eig.eigenvectors.column(order[1]).into_owned(),
        eig.eigenvectors.column(order[2]).into_owned(),
    ])
}

/// Row-major 9-vector to matrix.
fn mat_from_vec9(r: &Vec9) -> Mat3 {
    Mat3::from_row_slice(r.as_slice())
}

fn vec9_from_mat(m: &Mat3) -> Vec9 {
    Vec9::from_iterator(m.transpose().iter().copied())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Rotation3;
    use smilepnp_core::synthetic::{cube_corners, look_at, scattered_points};
    use smilepnp_core::{rms_error, rotation_angle_between, ImageSize, RadialDistortion};

    fn camera() -> CameraModel {
        CameraModel::new(
            1500.0,
            Pt2::new(960.0, 540.0),
            RadialDistortion::zeros(),
            ImageSize::new(1920, 1080),
        )
        .unwrap()
    }

    fn project(cam: &CameraModel, r: &Mat3, t: &Vec3, world: &[Pt3]) -> Vec<Pt2> {
        world
            .iter()
            .map(|pw| cam.project_world(r, t, pw).unwrap())
            .collect()
    }

    #[test]
    fn vec9_layout_is_row_major() {
        let m = Mat3::new(1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0);
        let v = vec9_from_mat(&m);
        assert_eq!(v[1], 2.0);
        assert_eq!(v[3], 4.0);
        assert_eq!(mat_from_vec9(&v), m);
    }

    #[test]
    fn omega_vanishes_on_true_rotation() {
        let cam = camera();
        let world = scattered_points();
        let r = Rotation3::from_euler_angles(0.2, -0.3, 0.1).into_inner();
        let t = Vec3::new(0.1, 0.2, 8.0);
        let rays = normalized_rays(&project(&cam, &r, &t, &world), &cam);

        let (omega, p) = omega_matrix(&world, &rays).unwrap();
        let rv = vec9_from_mat(&r);
        let err = (rv.transpose() * omega * rv)[(0, 0)];
        assert!(err.abs() < 1e-12);
        assert!((p * rv - t).norm() < 1e-9);
    }

    #[test]
    fn sqpnp_recovers_scattered_pose() {
        let cam = camera();
        let world = scattered_points();
        let r = Rotation3::from_euler_angles(0.4, 0.25, -0.6).into_inner();
        let t = Vec3::new(-0.3, 0.2, 7.5);
        let image = project(&cam, &r, &t, &world);

        let solutions = sqpnp(&world, &image, &cam, &SqpnpOptions::default()).unwrap();
        let best = &solutions[0];
        assert!(rotation_angle_between(&best.rotation, &r) < 1e-6);
        assert!((best.translation - t).norm() < 1e-6);
    }

    #[test]
    fn sqpnp_recovers_cube_from_look_at() {
        let cam = camera();
        let world = cube_corners(Pt3::origin(), 1.0);
        let (r, t) = look_at(&Pt3::new(3.0, -4.0, 2.5), &Pt3::origin(), &Vec3::z());
        let image = project(&cam, &r, &t, &world);

        let solutions = sqpnp(&world, &image, &cam, &SqpnpOptions::default()).unwrap();
        let rms = rms_error(&world, &image, &solutions[0].rotation, &solutions[0].translation, &cam)
            .unwrap();
        assert!(rms < 1e-6, "rms {rms}");
    }

    #[test]
    fn sqpnp_solutions_are_proper_rotations() {
        let cam = camera();
        let world = scattered_points();
        let r = Rotation3::from_euler_angles(-0.1, 0.5, 0.3).into_inner();
        let t = Vec3::new(0.0, 0.0, 6.0);
        let image = project(&cam, &r, &t, &world);

        for s in sqpnp(&world, &image, &cam, &SqpnpOptions::default()).unwrap() {
            assert!((s.rotation.determinant() - 1.0).abs() < 1e-6);
            assert!(orthogonality_error(&s.rotation) < 1e-8);
        }
    }

    #[test]
    fn sqpnp_fails_on_coincident_points() {
        let cam = camera();
        let world = vec![Pt3::new(0.5, 0.5, 0.5); 6];
        let image = vec![Pt2::new(1000.0, 600.0); 6];
        assert!(sqpnp(&world, &image, &cam, &SqpnpOptions::default()).is_err());
    }

    #[test]
    fn sqpnp_needs_three_points() {
        let cam = camera();
        let world = vec![Pt3::origin(), Pt3::new(1.0, 0.0, 0.0)];
        let image = vec![Pt2::new(960.0, 540.0), Pt2::new(1000.0, 540.0)];
        assert_eq!(
            sqpnp(&world, &image, &cam, &SqpnpOptions::default()),
            Err(PnpError::NotEnoughPoints { needed: 3, got: 2 })
        );
    }
}
