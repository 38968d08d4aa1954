use std::collections::HashMap;
use once_cell::sync::Lazy;

/// ENTSO-E EIC area code
pub type AreaCode = &'static str;

/// A bidding zone or control area that generation can be queried for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Area {
    /// Short key, e.g. `DE_LU`
    pub key: &'static str,
    pub code: AreaCode,
    pub name: &'static str,
}

impl Area {
    pub const fn new(key: &'static str, code: AreaCode, name: &'static str) -> Self {
        Self { key, code, name }
    }
}

/// Known areas keyed by short key
pub static AREAS: Lazy<HashMap<&'static str, Area>> = Lazy::new(|| {
    let areas = vec![
        Area::new("AL", "10YAL-KESH-----5", "Albania"),
        Area::new("AT", "10YAT-APG------L", "Austria"),
        Area::new("BE", "10YBE----------2", "Belgium"),
        Area::new("BG", "10YCA-BULGARIA-R", "Bulgaria"),
        Area::new("CH", "10YCH-SWISSGRIDZ", "Switzerland"),
        Area::new("CZ", "10YCZ-CEPS-----N", "Czech Republic"),
        Area::new("DE", "10Y1001A1001A83F", "Germany"),
        Area::new("DE_LU", "10Y1001A1001A82H", "Germany/Luxembourg"),
        Area::new("DK", "10Y1001A1001A65H", "Denmark"),
        Area::new("DK_1", "10YDK-1--------W", "Denmark DK1"),
        Area::new("DK_2", "10YDK-2--------M", "Denmark DK2"),
        Area::new("EE", "10Y1001A1001A39I", "Estonia"),
        Area::new("ES", "10YES-REE------0", "Spain"),
        Area::new("FI", "10YFI-1--------U", "Finland"),
        Area::new("FR", "10YFR-RTE------C", "France"),
        Area::new("GB", "10YGB----------A", "Great Britain"),
        Area::new("GR", "10YGR-HTSO-----Y", "Greece"),
        Area::new("HR", "10YHR-HEP------M", "Croatia"),
        Area::new("HU", "10YHU-MAVIR----U", "Hungary"),
        Area::new("IE_SEM", "10Y1001A1001A59C", "Ireland (SEM)"),
        Area::new("IT", "10YIT-GRTN-----B", "Italy"),
        Area::new("LT", "10YLT-1001A0008Q", "Lithuania"),
        Area::new("LU", "10YLU-CEGEDEL-NQ", "Luxembourg"),
        Area::new("LV", "10YLV-1001A00074", "Latvia"),
        Area::new("NL", "10YNL----------L", "Netherlands"),
        Area::new("NO", "10YNO-0--------C", "Norway"),
        Area::new("PL", "10YPL-AREA-----S", "Poland"),
        Area::new("PT", "10YPT-REN------W", "Portugal"),
        Area::new("RO", "10YRO-TEL------P", "Romania"),
        Area::new("RS", "10YCS-SERBIATSOV", "Serbia"),
        Area::new("SE", "10YSE-1--------K", "Sweden"),
        Area::new("SI", "10YSI-ELES-----O", "Slovenia"),
        Area::new("SK", "10YSK-SEPS-----K", "Slovakia"),
    ];

    areas.into_iter().map(|area| (area.key, area)).collect()
});

/// Resolve a short key (`FR`, `DE_LU`) or a raw EIC code to a known area
pub fn lookup(key_or_code: &str) -> Option<&'static Area> {
    AREAS.get(key_or_code).or_else(|| {
        AREAS
            .values()
            .find(|area| area.code == key_or_code)
    })
}

/// List all area keys, sorted
pub fn list_keys() -> Vec<&'static str> {
    let mut keys: Vec<_> = AREAS.keys().copied().collect();
    keys.sort();
    keys
}

impl std::fmt::Display for Area {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.key)
    }
}
