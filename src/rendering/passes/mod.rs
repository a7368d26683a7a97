pub mod pass;
pub mod pbr_pass;
pub mod tonemap_pass;
