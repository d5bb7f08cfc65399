// src/analytics/classifier.rs

use serde::Serialize;

use super::models::Provider;

const FOOTPRINT_DOMAIN: &str = "footprint.network";
const DUNE_DOMAIN: &str = "dune.com";

/// Which adapter a URL belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    FootprintDashboard,
    FootprintChart,
    DuneDashboard,
    DuneQuery,
}

impl Route {
    pub fn provider(&self) -> Provider {
        match self {
            Route::FootprintDashboard | Route::FootprintChart => Provider::Footprint,
            Route::DuneDashboard | Route::DuneQuery => Provider::Dune,
        }
    }
}

/// Picks an adapter from substring markers alone. No network access and no
/// further validation; a malformed URL on a known domain fails in its adapter.
pub fn classify(url: &str) -> Option<Route> {
    if url.contains(FOOTPRINT_DOMAIN) {
        if url.contains("/chart") {
            Some(Route::FootprintChart)
        } else {
            Some(Route::FootprintDashboard)
        }
    } else if url.contains(DUNE_DOMAIN) {
        if url.contains("queries") {
            Some(Route::DuneQuery)
        } else {
            Some(Route::DuneDashboard)
        }
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_footprint_routes() {
        assert_eq!(
            classify("https://www.footprint.network/@Traevon/Pixels-Mockup#type=dashboard"),
            Some(Route::FootprintDashboard)
        );
        assert_eq!(
            classify("https://www.footprint.network/guest/chart/Total-Pet-Minted-fp-e9135cea-f9cd-4c59-8371-b3078c9b1bbe"),
            Some(Route::FootprintChart)
        );
    }

    #[test]
    fn test_dune_routes() {
        assert_eq!(classify("https://dune.com/hildobby/dex-metrics"), Some(Route::DuneDashboard));
        assert_eq!(classify("https://dune.com/queries/3237721/5415223"), Some(Route::DuneQuery));
    }

    #[test]
    fn test_unknown_domain_is_unsupported() {
        assert_eq!(classify("https://flipsidecrypto.xyz/dashboards/abc"), None);
        assert_eq!(classify(""), None);
    }

    #[test]
    fn test_route_provider() {
        assert_eq!(Route::FootprintChart.provider(), Provider::Footprint);
        assert_eq!(Route::DuneQuery.provider(), Provider::Dune);
    }
}
