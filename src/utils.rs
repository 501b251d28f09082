//! Utility routines for loading samples and preparing them for the
//! estimators.
use std::collections::HashMap;
use std::path::Path;
use csv::ReaderBuilder;
use ndarray::prelude::*;
use ordered_float::OrderedFloat;

use crate::error::DataError;

/// Loads a CSV file of black-box samples.
///
/// The file format should be, for each row:
///     secret, o1, o2, ...
/// where o1, o2, ... form the output vector observed for that secret.
pub fn load_samples<P: AsRef<Path>>(path: P)
        -> Result<(Array1<f64>, Array2<f64>), DataError> {
    let mut reader = ReaderBuilder::new()
                                   .has_headers(false)
                                   .flexible(true)
                                   .trim(csv::Trim::All)
                                   .from_path(path)?;

    let mut secrets: Vec<f64> = Vec::new();
    let mut outputs: Vec<f64> = Vec::new();
    let mut ncols: Option<usize> = None;

    for (line, result) in reader.records().enumerate() {
        let record = result?;
        let line = line + 1;
        let parse = |value: &str| value.parse::<f64>().map_err(|_|
            DataError::Parse { line, value: value.to_owned() });

        // First one is the secret.
        let found = record.len().saturating_sub(1);
        match ncols {
            Some(expected) if expected != found =>
                return Err(DataError::Columns { line, expected, found }),
            None if found == 0 =>
                return Err(DataError::Columns { line, expected: 1, found }),
            _ => ncols = Some(found),
        }
        secrets.push(parse(&record[0])?);
        for value in record.iter().skip(1) {
            outputs.push(parse(value)?);
        }
    }

    let d = ncols.ok_or(DataError::Empty)?;
    let n = secrets.len();
    let outputs = Array::from_shape_vec((n, d), outputs)
                        .map_err(|_| DataError::Empty)?;
    Ok((Array::from_vec(secrets), outputs))
}

/// Returns true if all the elements of the matrix
/// can be converted into integers without loss.
///
/// # Examples
///
/// ```
/// use ndarray::array;
/// use privug::utils::has_integer_support;
///
/// assert!(has_integer_support(&array![[3., 6.], [0., -4.]].view()));
/// assert!(!has_integer_support(&array![[2., 5.5]].view()));
/// ```
pub fn has_integer_support(v: &ArrayView2<f64>) -> bool {
    v.iter().all(|x| x.fract() == 0.)
}

/// Whether every row of the matrix is the same.
pub fn is_constant(v: &ArrayView2<f64>) -> bool {
    match v.outer_iter().next() {
        Some(first) => v.outer_iter().all(|row| row == first),
        None => true,
    }
}

/// Represents d-dimensional rows as 1-dimensional unique ids.
///
/// Ids are assigned in order of first appearance, starting from the
/// largest id in `mapping` (if any) plus one.
pub fn rows_to_ids(objects: ArrayView2<f64>,
        mapping: Option<HashMap<Vec<OrderedFloat<f64>>, usize>>)
        -> (Array1<usize>, HashMap<Vec<OrderedFloat<f64>>, usize>) {
    let mut out = Vec::with_capacity(objects.nrows());

    let mut next_id = 0;
    let mut mapping = if let Some(mapping) = mapping {
        if let Some(id) = mapping.values().max() {
            next_id = id + 1;
        }
        mapping
    } else {
        HashMap::new()
    };

    for x in objects.outer_iter() {
        let key = x.iter().map(|v| OrderedFloat::from(*v)).collect::<Vec<_>>();
        let id = mapping.entry(key)
                        .or_insert_with(|| { next_id += 1; next_id-1 });
        out.push(*id);
    }

    (Array::from_vec(out), mapping)
}

/// Scales each column to unit variance (population standard deviation).
/// Constant columns are left untouched.
pub fn scale_unit_variance(matrix: &mut Array2<f64>) {
    let n = matrix.nrows() as f64;
    if n == 0. {
        return;
    }
    for mut column in matrix.columns_mut() {
        let mean = column.sum() / n;
        let std = (column.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n).sqrt();
        if std > 0. {
            column.mapv_inplace(|x| x / std);
        }
    }
}

/// Estimates the priors on a vector of ids, and returns the
/// largest one (the prior vulnerability).
pub fn max_prior(ids: &ArrayView1<usize>) -> f64 {
    let mut counts = HashMap::new();
    let mut max_count = 0;

    for y in ids {
        let count = counts.entry(y).or_insert(0);
        *count += 1;
        if *count > max_count {
            max_count = *count;
        }
    }

    if ids.is_empty() {
        return 0.;
    }
    f64::from(max_count) / (ids.len() as f64)
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_rows_to_ids() {
        let a = array![[1., 2., 3.],
                       [3., 4., 5.],
                       [6., 4., 3.],
                       [1., 2., 3.],
                       [6., 4., 3.],
                       [6., 4., 3.],
                       [9., 0., 2.],
                       [9., 0., 2.],
                       [6., 4., 3.]];
        let (ids_a, mapping) = rows_to_ids(a.view(), None);
        assert_eq!(ids_a, array![0, 1, 2, 0, 2, 2, 3, 3, 2]);

        // Call for a second array.
        let b = array![[9., 0., 2.],
                       [1., 2., 3.],
                       [0., 0., 0.],
                       [1., 2., 5.],
                       [6., 4., 3.]];
        let (ids_b, _) = rows_to_ids(b.view(), Some(mapping));
        assert_eq!(ids_b, array![3, 0, 4, 5, 2]);
    }

    #[test]
    fn test_scale() {
        let mut a = array![[2., 3., 5.],
                           [-2., 3., 10.],
                           [0., 3., 0.]];

        scale_unit_variance(&mut a);

        let std = (8f64 / 3.).sqrt();
        assert_eq!(a.column(0), array![2. / std, -2. / std, 0.]);
        // Constant column.
        assert_eq!(a.column(1), array![3., 3., 3.]);
    }

    #[test]
    fn test_constant_and_priors() {
        assert!(is_constant(&array![[1., 2.], [1., 2.]].view()));
        assert!(!is_constant(&array![[1., 2.], [1., 3.]].view()));
        assert_eq!(max_prior(&array![0, 1, 1, 2].view()), 0.5);
    }

    fn write_file(name: &str, content: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("privug-{}-{}.csv",
                                                     name, std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_samples() {
        let path = write_file("ok", "0, 0.1, 2.43\n1, 0.0, 1.22\n1, 1.0, 1.02\n");
        let (secrets, outputs) = load_samples(&path).unwrap();
        assert_eq!(secrets, array![0., 1., 1.]);
        assert_eq!(outputs, array![[0.1, 2.43], [0.0, 1.22], [1.0, 1.02]]);

        let path = write_file("bad", "0, 0.1\n1, x\n");
        match load_samples(&path).unwrap_err() {
            DataError::Parse { line, value } => assert_eq!((line, value.as_str()), (2, "x")),
            e => panic!("unexpected error {:?}", e),
        }

        let path = write_file("empty", "");
        assert!(matches!(load_samples(&path).unwrap_err(), DataError::Empty));
    }
}
