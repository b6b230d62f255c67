// Kbstate XKB Keymap
// libxkbcommon-backed keymaps and translation state

use xkbcommon::xkb;

use super::{KeyDirection, Keymap, KeymapError, ModComponent, RuleNames, TranslationState};

/// A compiled XKB keymap
pub struct XkbKeymap {
    keymap: xkb::Keymap,
}

impl XkbKeymap {
    /// Compile a keymap from RMLVO names, using the system XKB data
    pub fn from_names(names: &RuleNames) -> Result<Self, KeymapError> {
        let context = xkb::Context::new(xkb::CONTEXT_NO_FLAGS);
        let keymap = xkb::Keymap::new_from_names(
            &context,
            &names.rules,
            &names.model,
            &names.layout,
            &names.variant,
            names.options.clone(),
            xkb::KEYMAP_COMPILE_NO_FLAGS,
        )
        .ok_or_else(|| {
            KeymapError::Compile(format!(
                "no keymap for layout '{}' variant '{}'",
                names.layout, names.variant
            ))
        })?;
        Ok(Self { keymap })
    }

    /// Compile a keymap from its text (v1) form
    pub fn from_string(text: &str) -> Result<Self, KeymapError> {
        let context = xkb::Context::new(xkb::CONTEXT_NO_FLAGS);
        let keymap = xkb::Keymap::new_from_string(
            &context,
            text.to_string(),
            xkb::KEYMAP_FORMAT_TEXT_V1,
            xkb::KEYMAP_COMPILE_NO_FLAGS,
        )
        .ok_or_else(|| KeymapError::Compile("invalid keymap text".to_string()))?;
        Ok(Self { keymap })
    }

    /// The underlying libxkbcommon keymap
    pub fn raw(&self) -> &xkb::Keymap {
        &self.keymap
    }
}

impl From<xkb::Keymap> for XkbKeymap {
    fn from(keymap: xkb::Keymap) -> Self {
        Self { keymap }
    }
}

impl Keymap for XkbKeymap {
    type State = XkbState;

    fn new_state(&self) -> Result<XkbState, KeymapError> {
        Ok(XkbState {
            state: xkb::State::new(&self.keymap),
        })
    }

    fn serialize(&self) -> Result<String, KeymapError> {
        let text = self.keymap.get_as_string(xkb::KEYMAP_FORMAT_TEXT_V1);
        if text.is_empty() {
            return Err(KeymapError::Serialize("empty keymap string".to_string()));
        }
        Ok(text)
    }

    fn mod_index(&self, name: &str) -> Option<u32> {
        let index = self.keymap.mod_get_index(name);
        (index != xkb::MOD_INVALID).then_some(index)
    }

    fn led_index(&self, name: &str) -> Option<u32> {
        let index = self.keymap.led_get_index(name);
        (index != xkb::LED_INVALID).then_some(index)
    }
}

/// Translation state backed by `xkb_state`
pub struct XkbState {
    state: xkb::State,
}

impl TranslationState for XkbState {
    fn update_key(&mut self, keycode: u32, direction: KeyDirection) {
        let direction = match direction {
            KeyDirection::Up => xkb::KeyDirection::Up,
            KeyDirection::Down => xkb::KeyDirection::Down,
        };
        self.state.update_key(xkb::Keycode::new(keycode), direction);
    }

    fn update_mask(
        &mut self,
        depressed_mods: u32,
        latched_mods: u32,
        locked_mods: u32,
        depressed_layout: u32,
        latched_layout: u32,
        locked_layout: u32,
    ) {
        self.state.update_mask(
            depressed_mods,
            latched_mods,
            locked_mods,
            depressed_layout,
            latched_layout,
            locked_layout,
        );
    }

    fn serialize_mods(&self, component: ModComponent) -> u32 {
        let component = match component {
            ModComponent::Depressed => xkb::STATE_MODS_DEPRESSED,
            ModComponent::Latched => xkb::STATE_MODS_LATCHED,
            ModComponent::Locked => xkb::STATE_MODS_LOCKED,
        };
        self.state.serialize_mods(component)
    }

    fn serialize_layout(&self) -> u32 {
        self.state.serialize_layout(xkb::STATE_LAYOUT_EFFECTIVE)
    }

    fn led_index_is_active(&self, index: u32) -> bool {
        self.state.led_index_is_active(index)
    }
}
