/// Client APIs a framebuffer config can render with (bitmask).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub struct Renderable(u8);

impl Renderable {
    pub const NONE: Renderable = Renderable(0);
    pub const GLES2: Renderable = Renderable(1 << 2);
    pub const GLES3: Renderable = Renderable(1 << 6);

    pub fn contains(self, other: Renderable) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for Renderable {
    type Output = Renderable;

    fn bitor(self, rhs: Renderable) -> Renderable {
        Renderable(self.0 | rhs.0)
    }
}

/// Channel sizes and capabilities of one framebuffer config.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ConfigAttribs {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub alpha: u8,
    pub depth: u8,
    pub stencil: u8,
    pub renderable: Renderable,
}

impl ConfigAttribs {
    pub const fn rgba8(depth: u8, stencil: u8, renderable: Renderable) -> Self {
        Self {
            red: 8,
            green: 8,
            blue: 8,
            alpha: 8,
            depth,
            stencil,
            renderable,
        }
    }
}

/// Requested framebuffer profile.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ConfigSpec {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub alpha: u8,
    pub depth: u8,
    pub stencil: u8,
    pub client_version: u32,
}

impl ConfigSpec {
    /// RGBA8888 with an optional 16-bit depth buffer and no stencil.
    pub fn new(with_depth_buffer: bool, client_version: u32) -> Self {
        Self {
            red: 8,
            green: 8,
            blue: 8,
            alpha: 8,
            depth: if with_depth_buffer { 16 } else { 0 },
            stencil: 0,
            client_version,
        }
    }

    /// Renderable-type requirement; only client versions 2 and 3 add one.
    pub fn renderable(&self) -> Option<Renderable> {
        match self.client_version {
            2 => Some(Renderable::GLES2),
            3 => Some(Renderable::GLES3),
            _ => None,
        }
    }

    /// Coarse filter: every size at least the requested one and the
    /// renderable type supported.
    pub fn admits(&self, attribs: &ConfigAttribs) -> bool {
        attribs.red >= self.red
            && attribs.green >= self.green
            && attribs.blue >= self.blue
            && attribs.alpha >= self.alpha
            && attribs.depth >= self.depth
            && attribs.stencil >= self.stencil
            && self
                .renderable()
                .is_none_or(|r| attribs.renderable.contains(r))
    }

    /// Picks the first admitted config whose color channels match exactly
    /// and whose depth and stencil are at least the requested sizes.
    pub fn choose<C>(&self, configs: impl IntoIterator<Item = (C, ConfigAttribs)>) -> Option<C> {
        configs
            .into_iter()
            .filter(|(_, a)| self.admits(a))
            .find(|(_, a)| {
                a.red == self.red
                    && a.green == self.green
                    && a.blue == self.blue
                    && a.alpha == self.alpha
            })
            .map(|(config, _)| config)
    }
}

impl std::fmt::Display for ConfigSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "R{}G{}B{}A{} depth>={} stencil>={} client v{}",
            self.red,
            self.green,
            self.blue,
            self.alpha,
            self.depth,
            self.stencil,
            self.client_version
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ES3: Renderable = Renderable::GLES3;

    #[test]
    fn picks_first_exact_color_match() {
        let spec = ConfigSpec::new(true, 3);
        let configs = [
            (
                "rgb565",
                ConfigAttribs {
                    red: 5,
                    green: 6,
                    blue: 5,
                    alpha: 0,
                    depth: 16,
                    stencil: 0,
                    renderable: ES3,
                },
            ),
            (
                "rgba10",
                ConfigAttribs {
                    red: 10,
                    green: 10,
                    blue: 10,
                    alpha: 2,
                    depth: 24,
                    stencil: 0,
                    renderable: ES3,
                },
            ),
            ("rgba8-d24", ConfigAttribs::rgba8(24, 8, ES3)),
            ("rgba8-d16", ConfigAttribs::rgba8(16, 0, ES3)),
        ];
        assert_eq!(spec.choose(configs), Some("rgba8-d24"));
    }

    #[test]
    fn depth_must_cover_the_request() {
        let spec = ConfigSpec::new(true, 3);
        let configs = [("no-depth", ConfigAttribs::rgba8(0, 0, ES3))];
        assert_eq!(spec.choose(configs), None);

        let shallow = ConfigSpec::new(false, 3);
        assert_eq!(shallow.choose(configs), Some("no-depth"));
    }

    #[test]
    fn renderable_type_filters_by_client_version() {
        let es2_only = [("es2", ConfigAttribs::rgba8(16, 0, Renderable::GLES2))];
        assert_eq!(ConfigSpec::new(true, 3).choose(es2_only), None);
        assert_eq!(ConfigSpec::new(true, 2).choose(es2_only), Some("es2"));
        // other versions add no renderable requirement
        assert_eq!(ConfigSpec::new(true, 1).choose(es2_only), Some("es2"));
    }

    #[test]
    fn both_bits_satisfy_either_version() {
        let both = [(
            "both",
            ConfigAttribs::rgba8(16, 0, Renderable::GLES2 | Renderable::GLES3),
        )];
        assert_eq!(ConfigSpec::new(true, 2).choose(both), Some("both"));
        assert_eq!(ConfigSpec::new(true, 3).choose(both), Some("both"));
    }
}
