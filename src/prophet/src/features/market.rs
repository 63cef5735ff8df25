//! Market-derived features: implied probability, overround, normalized market
//! probability and the market divergence index.

use crate::error::Result;
use crate::stats::sigmoid;
use crate::table::EntrantTable;

/// Reserved odds-drift columns; always null until a live odds series exists.
pub const DRIFT_PLACEHOLDERS: [&str; 6] = [
    "drift_dp60",
    "drift_dp30",
    "drift_dp15",
    "drift_dp5",
    "dagf15",
    "dagf30",
];

const MDI_SCALE: f64 = 10.0;

pub fn implied_probability(odds: Option<f64>) -> Option<f64> {
    odds.filter(|o| *o > 0.0 && o.is_finite()).map(|o| 1.0 / o)
}

pub fn compute(table: &EntrantTable) -> Result<EntrantTable> {
    let mut out = table.clone();
    let races = table.races();

    let implied: Vec<Option<f64>> = table
        .entrants()
        .iter()
        .map(|e| implied_probability(e.odds))
        .collect();

    let per_race: Vec<Option<f64>> = races
        .groups()
        .iter()
        .map(|g| {
            let present: Vec<f64> = implied[g.range.clone()].iter().flatten().copied().collect();
            (!present.is_empty()).then(|| present.iter().sum())
        })
        .collect();
    let overround = races.broadcast(&per_race);

    let market_prob: Vec<Option<f64>> = implied
        .iter()
        .zip(&overround)
        .map(|(p, total)| Some(p.as_ref()? / total.as_ref()?))
        .collect();

    let mdi = table
        .column_or_null("public_money")
        .iter()
        .zip(&market_prob)
        .map(|(money, market)| {
            let divergence = money.as_ref()? - market.unwrap_or(0.0);
            Some(sigmoid(MDI_SCALE * divergence))
        })
        .collect();

    out.set_column("implied_prob", implied)?;
    out.set_column("market_overround", overround)?;
    out.set_column("market_prob", market_prob)?;
    out.set_column("mdi", mdi)?;
    for name in DRIFT_PLACEHOLDERS {
        out.set_column(name, vec![None; table.len()])?;
    }
    Ok(out)
}
