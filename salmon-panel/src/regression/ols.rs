//! MCO avec transformation within et variance CR1
//!
//! Algèbre linéaire sur `nalgebra`: X'X, inverse, sandwich `bread · meat · bread`.

use std::collections::BTreeMap;

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use watershed_coverage::PanelRow;

use super::{
    Coefficient, Grouping, ModelSpec, RegressionEngine, RegressionError, RegressionResult,
    VarianceKind,
};

const INTERCEPT: &str = "(Intercept)";

/// Une colonne est absorbée si le demeaning la ramène à ce niveau relatif
const ABSORB_TOLERANCE: f64 = 1e-9;

const PIVOT_TOLERANCE: f64 = 1e-10;

/// Quantiles 97.5 % de Student pour 1..=30 degrés de liberté
const T_975: [f64; 30] = [
    12.706_204_7,
    4.302_652_7,
    3.182_446_3,
    2.776_445_1,
    2.570_581_8,
    2.446_911_9,
    2.364_624_3,
    2.306_004_1,
    2.262_157_2,
    2.228_138_9,
    2.200_985_2,
    2.178_812_8,
    2.160_368_7,
    2.144_786_7,
    2.131_449_5,
    2.119_905_3,
    2.109_815_5,
    2.100_922_0,
    2.093_024_1,
    2.085_963_4,
    2.079_613_8,
    2.073_873_1,
    2.068_657_6,
    2.063_898_6,
    2.059_538_6,
    2.055_529_4,
    2.051_830_5,
    2.048_407_1,
    2.045_229_6,
    2.042_272_5,
];

const Z_975: f64 = 1.959_963_984_540_054;

/// MCO sur données demeanées par groupe d'effets fixes
///
/// Sans effets fixes, une constante est ajoutée au modèle.
#[derive(Debug, Clone, Copy, Default)]
pub struct WithinOls;

/// Indice de groupe de chaque ligne, groupes triés par clé
struct GroupIndex {
    of_row: Vec<usize>,
    count: usize,
}

fn group_index(rows: &[&PanelRow], grouping: Grouping) -> GroupIndex {
    let keys: BTreeMap<&str, usize> = rows
        .iter()
        .map(|r| grouping.key(r))
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .enumerate()
        .map(|(i, k)| (k, i))
        .collect();

    GroupIndex {
        of_row: rows.iter().map(|r| keys[grouping.key(r)]).collect(),
        count: keys.len(),
    }
}

fn demean(values: &mut [f64], index: &GroupIndex) {
    let mut sums = vec![0.0; index.count];
    let mut counts = vec![0usize; index.count];
    for (v, &g) in values.iter().zip(&index.of_row) {
        sums[g] += v;
        counts[g] += 1;
    }
    for (v, &g) in values.iter_mut().zip(&index.of_row) {
        *v -= sums[g] / counts[g] as f64;
    }
}

fn max_abs(values: &[f64]) -> f64 {
    values.iter().fold(0.0, |m, v| m.max(v.abs()))
}

/// Inverse de X'X; `None` si le rang est incomplet
fn invert_gram(xtx: DMatrix<f64>) -> Option<DMatrix<f64>> {
    let k = xtx.nrows();
    let scale = xtx.diagonal().max();
    if !(scale > 0.0) || xtx.rank(PIVOT_TOLERANCE * scale) < k {
        return None;
    }
    xtx.try_inverse()
}

/// Valeur critique bilatérale à 95 % de la loi de Student
///
/// Table exacte jusqu'à 30 ddl, développement de Cornish-Fisher au-delà.
pub(crate) fn t_critical_975(df: usize) -> f64 {
    if df == 0 {
        return f64::INFINITY;
    }
    if df <= T_975.len() {
        return T_975[df - 1];
    }

    let z = Z_975;
    let v = df as f64;
    let (z3, z5, z7) = (z.powi(3), z.powi(5), z.powi(7));
    z + (z3 + z) / (4.0 * v)
        + (5.0 * z5 + 16.0 * z3 + 3.0 * z) / (96.0 * v * v)
        + (3.0 * z7 + 19.0 * z5 + 17.0 * z3 - 15.0 * z) / (384.0 * v.powi(3))
}

impl RegressionEngine for WithinOls {
    fn name(&self) -> &'static str {
        "within_ols"
    }

    fn fit(&self, rows: &[PanelRow], spec: &ModelSpec) -> Result<RegressionResult, RegressionError> {
        let model = spec.name.clone();
        let rows = spec.select(rows);
        if rows.is_empty() {
            return Err(RegressionError::EmptyPanel { model });
        }
        let n = rows.len();

        let mut y: Vec<f64> = rows.iter().map(|r| r.value).collect();
        let mut columns: Vec<(String, Vec<f64>)> = Vec::with_capacity(spec.terms.len() + 1);
        for term in &spec.terms {
            let values = rows
                .iter()
                .map(|r| {
                    term.value(r).ok_or_else(|| RegressionError::MissingCovariate {
                        model: model.clone(),
                        term: term.name(),
                        unit_id: r.unit_id.clone(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            columns.push((term.name().to_string(), values));
        }

        let mut absorbed = Vec::new();
        let groups = match spec.fixed_effects {
            Some(grouping) => {
                let index = group_index(&rows, grouping);
                demean(&mut y, &index);
                columns.retain_mut(|(name, values)| {
                    let scale = max_abs(values).max(1.0);
                    demean(values, &index);
                    if max_abs(values) <= ABSORB_TOLERANCE * scale {
                        absorbed.push(name.clone());
                        false
                    } else {
                        true
                    }
                });
                Some(index.count)
            }
            None => {
                columns.insert(0, (INTERCEPT.to_string(), vec![1.0; n]));
                None
            }
        };

        if columns.is_empty() {
            return Err(RegressionError::NoEstimableTerm { model });
        }

        let k = columns.len();
        let parameters = k + groups.unwrap_or(0);
        if n <= parameters {
            return Err(RegressionError::DegreesOfFreedom {
                model,
                observations: n,
                parameters,
            });
        }

        let x = DMatrix::from_fn(n, k, |i, j| columns[j].1[i]);
        let y = DVector::from_vec(y);
        let xt = x.transpose();

        let bread = invert_gram(&xt * &x).ok_or_else(|| RegressionError::Singular {
            model: model.clone(),
        })?;
        let beta = &bread * (&xt * &y);
        let residuals = &y - &x * &beta;

        let (covariance, variance, clusters, df) = match spec.cluster {
            Some(grouping) => {
                let index = group_index(&rows, grouping);
                let g = index.count;
                if g < 2 {
                    return Err(RegressionError::TooFewClusters { model, clusters: g });
                }

                // Scores sommés par cluster: une ligne par cluster
                let mut scores = DMatrix::<f64>::zeros(g, k);
                for (i, &cluster) in index.of_row.iter().enumerate() {
                    for j in 0..k {
                        scores[(cluster, j)] += x[(i, j)] * residuals[i];
                    }
                }
                let meat = scores.transpose() * &scores;

                let factor = (g as f64 / (g - 1) as f64) * ((n - 1) as f64 / (n - k) as f64);
                (
                    &bread * meat * &bread * factor,
                    VarianceKind::Clustered,
                    Some(g),
                    g - 1,
                )
            }
            None => {
                let df = n - parameters;
                let sigma2 = residuals.norm_squared() / df as f64;
                (&bread * sigma2, VarianceKind::Homoskedastic, None, df)
            }
        };

        let critical = t_critical_975(df);
        let coefficients = columns
            .iter()
            .enumerate()
            .map(|(j, (term, _))| {
                let estimate = beta[j];
                let std_error = covariance[(j, j)].max(0.0).sqrt();
                Coefficient {
                    term: term.clone(),
                    estimate,
                    std_error,
                    t_value: estimate / std_error,
                    ci_low: estimate - critical * std_error,
                    ci_high: estimate + critical * std_error,
                }
            })
            .collect();

        debug!(
            model = %model,
            observations = n,
            groups = ?groups,
            clusters = ?clusters,
            absorbed = ?absorbed,
            "Model fitted"
        );

        Ok(RegressionResult {
            model,
            engine: self.name().to_string(),
            observations: n,
            groups,
            clusters,
            df,
            variance,
            coefficients,
            absorbed,
        })
    }
}
