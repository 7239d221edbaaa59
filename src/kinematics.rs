use std::f64::consts::PI;
use std::ops::{Add, AddAssign};

/// Cartesian four-momentum `(E, px, py, pz)` in GeV.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct FourMomentum {
    pub e: f64,
    pub px: f64,
    pub py: f64,
    pub pz: f64,
}

impl FourMomentum {
    pub fn new(e: f64, px: f64, py: f64, pz: f64) -> Self {
        Self { e, px, py, pz }
    }

    pub fn from_pt_eta_phi_m(pt: f64, eta: f64, phi: f64, m: f64) -> Self {
        let px = pt * phi.cos();
        let py = pt * phi.sin();
        let pz = pt * eta.sinh();
        let p2 = (pt * eta.cosh()).powi(2);
        Self {
            e: f64::sqrt(p2 + m * m),
            px,
            py,
            pz,
        }
    }

    pub fn p2(&self) -> f64 {
        self.px * self.px + self.py * self.py + self.pz * self.pz
    }

    pub fn m2(&self) -> f64 {
        self.e * self.e - self.p2()
    }

    /// Invariant mass. Space-like vectors get a negative mass, `-sqrt(-m2)`.
    pub fn mass(&self) -> f64 {
        let m2 = self.m2();
        if m2 >= 0.0 {
            m2.sqrt()
        } else {
            -(-m2).sqrt()
        }
    }

    pub fn pt(&self) -> f64 {
        self.px.hypot(self.py)
    }

    pub fn phi(&self) -> f64 {
        if self.px == 0.0 && self.py == 0.0 {
            0.0
        } else {
            self.py.atan2(self.px)
        }
    }

    pub fn eta(&self) -> f64 {
        let pt = self.pt();
        if pt == 0.0 {
            return if self.pz >= 0.0 { f64::INFINITY } else { f64::NEG_INFINITY };
        }
        (self.pz / pt).asinh()
    }

    /// Velocity of the rest frame of this vector.
    pub fn beta(&self) -> [f64; 3] {
        [self.px / self.e, self.py / self.e, self.pz / self.e]
    }

    /// Lorentz boost by the velocity `beta`.
    pub fn boost(&self, beta: [f64; 3]) -> Self {
        let b2 = beta[0] * beta[0] + beta[1] * beta[1] + beta[2] * beta[2];
        if b2 == 0.0 {
            return *self;
        }
        let gamma = 1.0 / f64::sqrt(1.0 - b2);
        let bp = beta[0] * self.px + beta[1] * self.py + beta[2] * self.pz;
        let gamma2 = (gamma - 1.0) / b2;
        Self {
            e: gamma * (self.e + bp),
            px: self.px + gamma2 * bp * beta[0] + gamma * beta[0] * self.e,
            py: self.py + gamma2 * bp * beta[1] + gamma * beta[1] * self.e,
            pz: self.pz + gamma2 * bp * beta[2] + gamma * beta[2] * self.e,
        }
    }

    /// Splits this vector into two daughters of masses `m1` and `m2`, emitted
    /// back to back along `(costheta, phi)` in the rest frame.
    pub fn two_body_decay(&self, m1: f64, m2: f64, costheta: f64, phi: f64) -> (Self, Self) {
        let m = self.mass().max(m1 + m2);
        let p_star = f64::sqrt((m * m - (m1 + m2).powi(2)) * (m * m - (m1 - m2).powi(2))) / (2.0 * m);
        let sintheta = f64::sqrt(1.0 - costheta * costheta);
        let (x, y, z) = (
            p_star * sintheta * phi.cos(),
            p_star * sintheta * phi.sin(),
            p_star * costheta,
        );
        let d1 = FourMomentum::new(f64::sqrt(p_star * p_star + m1 * m1), x, y, z);
        let d2 = FourMomentum::new(f64::sqrt(p_star * p_star + m2 * m2), -x, -y, -z);
        let beta = self.beta();
        (d1.boost(beta), d2.boost(beta))
    }
}

impl Add for FourMomentum {
    type Output = FourMomentum;

    fn add(self, rhs: FourMomentum) -> FourMomentum {
        FourMomentum {
            e: self.e + rhs.e,
            px: self.px + rhs.px,
            py: self.py + rhs.py,
            pz: self.pz + rhs.pz,
        }
    }
}

impl AddAssign for FourMomentum {
    fn add_assign(&mut self, rhs: FourMomentum) {
        *self = *self + rhs;
    }
}

impl std::iter::Sum for FourMomentum {
    fn sum<I: Iterator<Item = FourMomentum>>(iter: I) -> Self {
        iter.fold(FourMomentum::default(), |acc, p| acc + p)
    }
}

/// Azimuthal difference wrapped into `[-pi, pi)`.
pub fn delta_phi(phi1: f64, phi2: f64) -> f64 {
    let mut dphi = (phi1 - phi2) % (2.0 * PI);
    if dphi >= PI {
        dphi -= 2.0 * PI;
    } else if dphi < -PI {
        dphi += 2.0 * PI;
    }
    dphi
}

pub fn delta_r(eta1: f64, phi1: f64, eta2: f64, phi2: f64) -> f64 {
    f64::sqrt((eta1 - eta2).powi(2) + delta_phi(phi1, phi2).powi(2))
}
