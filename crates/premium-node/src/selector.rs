use premium_common::ContractSnapshot;

/// Pick the snapshot whose |delta| is closest to `target_delta`.
///
/// Snapshots without a usable delta are skipped. A later snapshot only
/// replaces the current best when it is strictly closer, so the first one
/// encountered wins an exact tie.
pub fn pick(snapshots: &[ContractSnapshot], target_delta: f64) -> Option<&ContractSnapshot> {
    let mut best: Option<(&ContractSnapshot, f64)> = None;

    for snapshot in snapshots {
        let Some(delta) = snapshot.delta.filter(|d| d.is_finite()) else {
            continue;
        };
        let distance = (delta.abs() - target_delta).abs();
        if best.map_or(true, |(_, best_distance)| distance < best_distance) {
            best = Some((snapshot, distance));
        }
    }

    best.map(|(snapshot, _)| snapshot)
}
