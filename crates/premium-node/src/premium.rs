use premium_common::ContractSnapshot;

/// Which field of the snapshot produced the premium.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PremiumBasis {
    Mid,
    LastTrade,
    Ask,
    Bid,
    PrevClose,
}

/// Premium with the step of the fallback order that produced it.
///
/// Order: bid/ask midpoint (both present, ask > 0, bid >= 0), last trade,
/// ask, bid, previous-day close.
pub fn estimate_with_basis(snapshot: &ContractSnapshot) -> Option<(f64, PremiumBasis)> {
    if let (Some(bid), Some(ask)) = (snapshot.bid, snapshot.ask) {
        if ask > 0.0 && bid >= 0.0 {
            return Some(((ask + bid) / 2.0, PremiumBasis::Mid));
        }
    }

    [
        (snapshot.last_trade, PremiumBasis::LastTrade),
        (snapshot.ask, PremiumBasis::Ask),
        (snapshot.bid, PremiumBasis::Bid),
        (snapshot.prev_close, PremiumBasis::PrevClose),
    ]
    .into_iter()
    .find_map(|(value, basis)| value.map(|v| (v, basis)))
}

/// Premium estimate for one contract, or `None` when nothing is usable.
pub fn estimate(snapshot: &ContractSnapshot) -> Option<f64> {
    estimate_with_basis(snapshot).map(|(premium, _)| premium)
}
