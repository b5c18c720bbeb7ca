/// User interface components
///
/// - Damage marker map canvas (map.rs)
/// - Filter bar, result list, detail and report panels (panels.rs)

pub mod map;
pub mod panels;
