//! Akamai-style query parameter translation (§11 peripheral collaborator).
//!
//! Grounded on `image_optimizer::params::ImageParams`'s dual query/path
//! parse shape: a fixed vocabulary of recognized parameter names, each
//! independently optional, folded onto an already-constructed
//! [`TransformRecipe`] rather than replacing its own `from_query`. Akamai
//! Image & Video Manager callers address dimensions and quality with
//! `im`-prefixed names (`imwidth`, `imheight`, `imquality`, `imformat`,
//! `imcrop`) instead of this gateway's native `w`/`h`/`q`/`f` — this module
//! is only that renaming layer.

use std::collections::HashMap;

use crate::recipe::{FitMode, Quality, RecipeError, TransformRecipe};

const RECOGNIZED: &[&str] = &["imwidth", "imheight", "imquality", "imformat", "imfit", "imdensity"];

fn invalid(param: &str, message: impl Into<String>) -> RecipeError {
    RecipeError::InvalidParameter {
        param: param.to_string(),
        message: message.into(),
    }
}

/// True if `params` carries any recognized Akamai-style key, so callers can
/// skip this translation entirely for ordinary native-param requests.
pub fn has_akamai_params(params: &HashMap<String, String>) -> bool {
    RECOGNIZED.iter().any(|k| params.contains_key(*k))
}

/// Apply Akamai-style params onto an already-parsed recipe, overriding any
/// native field they address. Native params not covered by the Akamai
/// vocabulary (mode, time window, playback, custom data) pass through
/// untouched.
pub fn apply(recipe: &mut TransformRecipe, params: &HashMap<String, String>) -> Result<(), RecipeError> {
    if let Some(w) = params.get("imwidth") {
        recipe.width = Some(parse_dimension(w, "imwidth")?);
    }
    if let Some(h) = params.get("imheight") {
        recipe.height = Some(parse_dimension(h, "imheight")?);
    }
    if let Some(q) = params.get("imquality") {
        recipe.quality = Some(translate_quality(q)?);
    }
    if let Some(f) = params.get("imformat") {
        recipe.format = Some(f.to_lowercase());
    }
    if let Some(fit) = params.get("imfit") {
        recipe.fit = translate_fit(fit)?;
    }
    // `imdensity` (device pixel ratio) scales width/height when both are
    // already known; with neither dimension set there's nothing to scale.
    if let Some(density) = params.get("imdensity") {
        let dpr: f32 = density.parse().map_err(|_| invalid("imdensity", "must be a number"))?;
        if !(0.1..=4.0).contains(&dpr) {
            return Err(invalid("imdensity", "must be between 0.1 and 4"));
        }
        if let Some(w) = recipe.width {
            recipe.width = Some(((w as f32) * dpr).round() as u32);
        }
        if let Some(h) = recipe.height {
            recipe.height = Some(((h as f32) * dpr).round() as u32);
        }
    }
    Ok(())
}

fn parse_dimension(value: &str, field: &'static str) -> Result<u32, RecipeError> {
    value.parse().map_err(|_| invalid(field, "must be a positive integer"))
}

/// Akamai's `imquality` is a 1-100 integer scale; the gateway's native
/// `Quality` is a coarse four-value vocabulary, so bucket it the way the
/// teacher's params module buckets continuous DPR into a small scale.
fn translate_quality(value: &str) -> Result<Quality, RecipeError> {
    let pct: u8 = value.parse().map_err(|_| invalid("imquality", "must be an integer 1-100"))?;
    match pct {
        0 => Err(invalid("imquality", "must be between 1 and 100")),
        1..=40 => Ok(Quality::Low),
        41..=70 => Ok(Quality::Medium),
        71..=100 => Ok(Quality::High),
        _ => Err(invalid("imquality", "must be between 1 and 100")),
    }
}

fn translate_fit(value: &str) -> Result<FitMode, RecipeError> {
    match value.to_lowercase().as_str() {
        "crop" => Ok(FitMode::Crop),
        "fit" => Ok(FitMode::Contain),
        "scale" => Ok(FitMode::ScaleDown),
        "pad" => Ok(FitMode::Pad),
        other => Err(invalid("imfit", format!("unknown imfit: {}", other))),
    }
}
