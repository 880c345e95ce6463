//! Shader resource group stand-in.
//!
//! The orchestration layer only needs a place for scene and view level shader
//! constants to be written before a frame is rendered; the actual GPU upload
//! belongs to the backend and is out of scope here.

use std::collections::HashMap;

/// Named-constant store compiled once per frame.
#[derive(Debug, Default)]
pub struct ShaderResourceGroup {
    name: String,
    constants: HashMap<String, f32>,
    generation: u64,
}

impl ShaderResourceGroup {
    /// Creates an empty group with the given debug name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            constants: HashMap::new(),
            generation: 0,
        }
    }

    /// Debug name of this group.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sets a named constant, overwriting any previous value.
    pub fn set_constant(&mut self, name: impl Into<String>, value: f32) {
        self.constants.insert(name.into(), value);
    }

    /// Reads a named constant.
    pub fn constant(&self, name: &str) -> Option<f32> {
        self.constants.get(name).copied()
    }

    /// Marks the current constants as uploaded for this frame.
    pub fn compile(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        log::trace!(
            "Compiled srg '{}' (generation {}, {} constants)",
            self.name,
            self.generation,
            self.constants.len()
        );
    }

    /// Number of completed compilations.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_round_trip() {
        let mut srg = ShaderResourceGroup::new("scene");
        srg.set_constant("exposure", 1.5);
        assert_eq!(srg.constant("exposure"), Some(1.5));
        assert_eq!(srg.constant("missing"), None);
    }

    #[test]
    fn compile_bumps_generation() {
        let mut srg = ShaderResourceGroup::new("view");
        assert_eq!(srg.generation(), 0);
        srg.compile();
        srg.compile();
        assert_eq!(srg.generation(), 2);
    }
}
