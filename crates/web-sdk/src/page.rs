//! Page context — the embedding page's location, referrer, and the surface
//! conversion pixels are rendered into.

use parking_lot::Mutex;
use url::Url;

/// Ambient page state the tracker reads from.
pub trait Page: Send + Sync {
    /// Current page URL, if known.
    fn location(&self) -> Option<Url>;

    /// Referring page, empty when none.
    fn referrer(&self) -> String;

    /// Render an HTML fragment into an invisible 1x1 inline frame.
    fn render_pixel(&self, html: &str);

    /// First value of a query parameter on the current URL.
    fn url_parameter(&self, name: &str) -> Option<String> {
        let location = self.location()?;
        location
            .query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }

    fn hostname(&self) -> String {
        self.location()
            .and_then(|url| url.host_str().map(str::to_string))
            .unwrap_or_default()
    }

    fn pathname(&self) -> String {
        self.location()
            .map(|url| url.path().to_string())
            .unwrap_or_default()
    }

    /// Raw query string including the leading `?`, empty when there is none.
    fn search(&self) -> String {
        match self.location().as_ref().and_then(Url::query) {
            Some(query) if !query.is_empty() => format!("?{query}"),
            _ => String::new(),
        }
    }
}

/// Fixed page context. Rendered pixels are captured rather than displayed.
#[derive(Default)]
pub struct StaticPage {
    location: Option<Url>,
    referrer: String,
    pixels: Mutex<Vec<String>>,
}

impl StaticPage {
    pub fn new(location: Option<Url>, referrer: impl Into<String>) -> Self {
        Self {
            location,
            referrer: referrer.into(),
            pixels: Mutex::new(Vec::new()),
        }
    }

    /// Page at `url`; an unparsable URL yields a page with no location.
    pub fn at(url: &str) -> Self {
        Self::new(Url::parse(url).ok(), "")
    }

    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = referrer.into();
        self
    }

    /// Pixels rendered so far, in order.
    pub fn rendered_pixels(&self) -> Vec<String> {
        self.pixels.lock().clone()
    }
}

impl Page for StaticPage {
    fn location(&self) -> Option<Url> {
        self.location.clone()
    }

    fn referrer(&self) -> String {
        self.referrer.clone()
    }

    fn render_pixel(&self, html: &str) {
        self.pixels.lock().push(html.to_string());
    }
}
