use photon_grid_lib::metrics::{read_dat, Divergence};
use photon_grid_lib::{
    build_grid, parse_bundle, read_bundle, FatPhotonDataset, PhiThetaGrid, PhotonFormat,
    PhotonRepresentation,
};
use std::fs;

fn bundle_bytes(header: [f32; 9], photons: &[[f32; 9]]) -> Vec<u8> {
    let mut raw = Vec::new();
    for f in header {
        raw.extend_from_slice(&f.to_le_bytes());
    }
    raw.extend_from_slice(&(photons.len() as i32).to_le_bytes());
    for photon in photons {
        for f in photon {
            raw.extend_from_slice(&f.to_le_bytes());
        }
    }
    raw
}

#[rustfmt::skip]
const HEADER: [f32; 9] = [
    // position
    0.0, 0.0, 0.0,
    // normal
    0.0, 1.0, 0.0,
    // wi
    0.0, 1.0, 0.0,
];

#[rustfmt::skip]
const TWO_PHOTONS: [[f32; 9]; 2] = [
    [0.0, 0.0, 0.0,  1.0, 0.0, 0.0,  1.0, 1.0, 1.0],
    [0.0, 0.0, 0.0,  0.0, 0.0, 1.0,  1.0, 1.0, 1.0],
];

#[test]
fn test_two_photon_bundle_end_to_end() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let bundle_path = dir.path().join("photons_0001-block_0x0.bin");
    fs::write(&bundle_path, bundle_bytes(HEADER, &TWO_PHOTONS)).unwrap();

    let bundle = read_bundle(&bundle_path, PhotonFormat::V1).unwrap();
    assert_eq!(bundle.len(), 2);

    let mut grid = PhiThetaGrid::with_steps(4, 4).unwrap();
    let stats = build_grid(&bundle, &mut grid).unwrap();
    assert_eq!(stats.splatted, 2);

    let grid_path = dir.path().join("photon-bundle_00000.dat");
    grid.export_dat(&grid_path).unwrap();

    let pdf = read_dat(&grid_path).unwrap();
    assert_eq!(pdf.len(), 16);
    assert!((pdf.iter().sum::<f32>() - 1.0).abs() < 1e-6);
    let occupied: Vec<f32> = pdf.iter().copied().filter(|&p| p != 0.0).collect();
    assert_eq!(occupied, vec![0.5, 0.5]);
}

#[test]
fn test_exports_are_reproducible() {
    #[rustfmt::skip]
    let photons = [
        [0.0, 0.0, 0.0,  0.3, 0.9, 0.1,  0.2, 0.4, 0.6],
        [0.0, 0.0, 0.0,  -0.5, 0.7, 0.2,  1.0, 0.0, 0.5],
        [0.0, 0.0, 0.0,  0.1, 0.2, -0.9,  3.0, 3.0, 3.0],
        [0.0, 0.0, 0.0,  0.0, 0.0, 0.0,  9.0, 9.0, 9.0],
    ];
    let mut header = HEADER;
    header[6..].copy_from_slice(&[0.0, 0.6, 0.8]);
    let raw = bundle_bytes(header, &photons);

    let export = || {
        let bundle = parse_bundle(&raw, PhotonFormat::V1).unwrap();
        let mut grid = PhiThetaGrid::with_steps(16, 8).unwrap();
        let mut fat = FatPhotonDataset::new(false);
        let stats = build_grid(&bundle, &mut grid).unwrap();
        build_grid(&bundle, &mut fat).unwrap();
        (stats, grid.to_dat_bytes(), fat.to_dat_bytes())
    };

    let (stats, grid_a, fat_a) = export();
    let (_, grid_b, fat_b) = export();
    assert_eq!(grid_a, grid_b);
    assert_eq!(fat_a, fat_b);

    assert_eq!(stats.degenerate, 1);
    assert_eq!(stats.attempted(), 4);
    assert_eq!(fat_a.len(), 3 * 3 * 4);
}

#[test]
fn test_grid_matches_itself_under_divergence() {
    let raw = bundle_bytes(HEADER, &TWO_PHOTONS);
    let bundle = parse_bundle(&raw, PhotonFormat::V1).unwrap();
    let mut grid = PhiThetaGrid::with_steps(4, 4).unwrap();
    build_grid(&bundle, &mut grid).unwrap();

    let pdf = grid.pdf();
    let divergence = Divergence::between(&pdf, &pdf).unwrap();
    assert_eq!(divergence.kl, 0.0);
    assert_eq!(divergence.l1, 0.0);
}
