//! Integration tests: cross-match random catalogs and compare against a
//! brute-force mutual-nearest-neighbour reference.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use sinistra::catalogs::{read_table_csv, write_table_csv};
use sinistra::skycoord::angular_separation_arcsec;
use sinistra::{symmetric_match, Column, CrossMatchConfig, DataKind, SkyPosition, Table, Value};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();
}

fn random_position(rng: &mut StdRng) -> (f64, f64) {
    let ra = rng.random_range(0.0..360.0);
    let z: f64 = rng.random_range(-1.0..1.0);
    (ra, z.asin().to_degrees())
}

/// Offset a position by a random jitter of `sigma_arcsec` per axis.
fn jitter(rng: &mut StdRng, (ra, dec): (f64, f64), sigma_arcsec: f64) -> (f64, f64) {
    let normal = Normal::new(0.0, sigma_arcsec / 3600.0).unwrap();
    let dec_new = (dec + normal.sample(rng)).clamp(-90.0, 90.0);
    let cos_dec = dec.to_radians().cos().max(1e-6);
    let ra_new = (ra + normal.sample(rng) / cos_dec).rem_euclid(360.0);
    (ra_new, dec_new)
}

fn catalog(points: &[(f64, f64)]) -> Table {
    let schema = vec![
        Column::new("id", DataKind::Int),
        Column::new("ra", DataKind::Float),
        Column::new("dec", DataKind::Float),
    ];
    let rows = points
        .iter()
        .enumerate()
        .map(|(i, &(ra, dec))| vec![Value::Int(i as i64), Value::Float(ra), Value::Float(dec)])
        .collect();
    Table::from_rows(schema, rows).unwrap()
}

fn positions(points: &[(f64, f64)]) -> Vec<SkyPosition> {
    points
        .iter()
        .map(|&(ra, dec)| SkyPosition::new(ra, dec).unwrap())
        .collect()
}

/// All-pairs nearest neighbour, lowest index on ties.
fn brute_nearest(from: &[SkyPosition], to: &[SkyPosition]) -> Vec<(usize, f64)> {
    from.iter()
        .map(|p| {
            let mut best = (0, f64::INFINITY);
            for (j, q) in to.iter().enumerate() {
                let sep = angular_separation_arcsec(p, q);
                if sep < best.1 {
                    best = (j, sep);
                }
            }
            best
        })
        .collect()
}

fn brute_matches(a: &[(f64, f64)], b: &[(f64, f64)], max_sep: f64) -> Vec<(usize, usize)> {
    let pa = positions(a);
    let pb = positions(b);
    let a_to_b = brute_nearest(&pa, &pb);
    let b_to_a = brute_nearest(&pb, &pa);
    a_to_b
        .iter()
        .enumerate()
        .filter(|&(ia, &(ib, sep))| sep < max_sep && b_to_a[ib].0 == ia)
        .map(|(ia, &(ib, _))| (ia, ib))
        .collect()
}

/// Catalog B of random positions and catalog A holding jittered copies of most
/// of them plus unrelated positions.
fn random_catalogs(seed: u64, n: usize, sigma_arcsec: f64) -> (Vec<(f64, f64)>, Vec<(f64, f64)>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let b: Vec<(f64, f64)> = (0..n).map(|_| random_position(&mut rng)).collect();
    let mut a: Vec<(f64, f64)> = b
        .iter()
        .take(n * 3 / 4)
        .map(|&p| jitter(&mut rng, p, sigma_arcsec))
        .collect();
    a.extend((0..n / 4).map(|_| random_position(&mut rng)));
    (a, b)
}

#[test]
fn matches_agree_with_brute_force() {
    init_tracing();
    let (a, b) = random_catalogs(11, 1000, 1.0);
    let config = CrossMatchConfig::default();

    let result = symmetric_match(&catalog(&a), &catalog(&b), &config).unwrap();
    let found: Vec<(usize, usize)> = result.matches.iter().map(|m| (m.index_a, m.index_b)).collect();
    let expected = brute_matches(&a, &b, config.max_sep_arcsec);
    assert_eq!(found, expected);
    // Most jittered copies are recovered.
    assert!(found.len() > 700, "only {} matches", found.len());

    for (row, m) in result.matches.iter().enumerate() {
        assert!(m.separation_arcsec < config.max_sep_arcsec);
        assert_eq!(result.table.get(row, "id"), Some(&Value::Int(m.index_a as i64)));
        assert_eq!(result.table.get(row, "id_2"), Some(&Value::Int(m.index_b as i64)));
        assert_eq!(
            result.table.get(row, "separation"),
            Some(&Value::Float(m.separation_arcsec))
        );
    }
}

#[test]
fn tight_cutoff_agrees_with_brute_force() {
    init_tracing();
    let (a, b) = random_catalogs(12, 800, 2.0);
    let config = CrossMatchConfig {
        max_sep_arcsec: 1.0,
        ..Default::default()
    };
    let result = symmetric_match(&catalog(&a), &catalog(&b), &config).unwrap();
    let found: Vec<(usize, usize)> = result.matches.iter().map(|m| (m.index_a, m.index_b)).collect();
    assert_eq!(found, brute_matches(&a, &b, 1.0));
}

#[test]
fn crowded_field_near_pole() {
    init_tracing();
    // Dense enough that many nearest neighbours are not mutual.
    let mut rng = StdRng::seed_from_u64(13);
    let near_pole = |rng: &mut StdRng| -> (f64, f64) {
        let ra = rng.random_range(0.0..360.0);
        let dec = 90.0 - rng.random_range(0.0..0.01);
        (ra, dec)
    };
    let a: Vec<(f64, f64)> = (0..400).map(|_| near_pole(&mut rng)).collect();
    let b: Vec<(f64, f64)> = (0..400).map(|_| near_pole(&mut rng)).collect();
    let config = CrossMatchConfig {
        max_sep_arcsec: 5.0,
        ..Default::default()
    };

    let result = symmetric_match(&catalog(&a), &catalog(&b), &config).unwrap();
    let found: Vec<(usize, usize)> = result.matches.iter().map(|m| (m.index_a, m.index_b)).collect();
    assert_eq!(found, brute_matches(&a, &b, 5.0));
    assert!(!found.is_empty());
}

#[test]
fn pairs_across_ra_seam_and_pole() {
    init_tracing();
    let a = catalog(&[(359.9999, 10.0), (0.0, 89.9999), (120.0, -30.0)]);
    let b = catalog(&[(180.0, 89.9999), (0.0001, 10.0), (120.0, -30.5)]);

    let result = symmetric_match(&a, &b, &CrossMatchConfig::default()).unwrap();
    let pairs: Vec<(usize, usize)> = result.matches.iter().map(|m| (m.index_a, m.index_b)).collect();
    assert_eq!(pairs, vec![(0, 1), (1, 0)]);

    let seam = 0.0002 * 10f64.to_radians().cos() * 3600.0;
    assert!((result.matches[0].separation_arcsec - seam).abs() < 1e-3);
    assert!((result.matches[1].separation_arcsec - 0.72).abs() < 1e-3);
}

#[test]
fn repeated_runs_are_identical() {
    let (a, b) = random_catalogs(14, 500, 1.0);
    let (ta, tb) = (catalog(&a), catalog(&b));
    let config = CrossMatchConfig::default();

    let first = symmetric_match(&ta, &tb, &config).unwrap();
    let second = symmetric_match(&ta, &tb, &config).unwrap();
    assert_eq!(first.matches, second.matches);
    assert_eq!(first.table, second.table);

    // Index resolution is an internal detail.
    for nside in [1, 4, 128] {
        let config = CrossMatchConfig {
            index_nside: Some(nside),
            ..Default::default()
        };
        let other = symmetric_match(&ta, &tb, &config).unwrap();
        assert_eq!(other.matches, first.matches, "nside {nside}");
    }
}

#[test]
fn match_csv_catalogs() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path_a = dir.path().join("a.csv");
    let path_b = dir.path().join("b.csv");
    let path_out = dir.path().join("matched.csv");

    std::fs::write(&path_a, "name,ra,dec,mag\nstar1,10.0,0.0,12.5\nstar2,50.0,20.0,\n").unwrap();
    std::fs::write(&path_b, "name,ra,decl,mag\nx,50.0,20.0003,13.1\ny,10.0,0.00001,11.9\n").unwrap();

    let a = read_table_csv(&path_a).unwrap();
    let b = read_table_csv(&path_b).unwrap();
    let config = CrossMatchConfig {
        dec_col_b: "decl".to_string(),
        ..Default::default()
    };
    let result = symmetric_match(&a, &b, &config).unwrap();
    assert_eq!(result.len(), 2);
    assert_eq!(
        result.table.column_names(),
        vec!["name", "ra", "dec", "mag", "name_2", "ra_2", "decl", "mag_2", "separation"]
    );
    assert_eq!(result.table.get(0, "name_2"), Some(&Value::Str("y".to_string())));
    assert_eq!(result.table.get(1, "name_2"), Some(&Value::Str("x".to_string())));
    assert!(result.table.get(1, "mag").unwrap().is_empty_placeholder());

    write_table_csv(&result.table, &path_out).unwrap();
    let reloaded = read_table_csv(&path_out).unwrap();
    assert_eq!(reloaded.len(), 2);
    assert_eq!(reloaded.column_names(), result.table.column_names());
}
