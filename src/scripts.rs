//! Registry of in-page script payloads.
//!
//! Scripts are opaque to the core: each entry has a name, a source string
//! evaluated inside the page, and a declared JSON return shape. Control flow
//! never inspects script text — it looks payloads up by name and consumes
//! their serialized result.

/// Installs a background poll that flags every link that is ever seen as
/// `rel=preload` or disabled. Returns nothing; state accumulates on
/// `window.__asyncLinks` keyed by href.
pub const SAVE_ASYNC_LINKS: &str = "save-async-links";

/// Collects head scripts, stylesheets, and imports that are synchronous by
/// declaration, minus anything the async-link poll flagged. Returns an array
/// of `{tagName, url, rel, media, disabled}`.
pub const COLLECT_BLOCKING_TAGS: &str = "collect-blocking-tags";

/// Returns `window.location.href` — the final URL after any redirects.
pub const FINAL_URL: &str = "final-url";

const SAVE_ASYNC_LINKS_SRC: &str = r#"
(function saveAsyncLinks() {
  function checkForLinks() {
    document.querySelectorAll('link').forEach(link => {
      if (link.rel === 'preload' || link.disabled) {
        window.__asyncLinks[link.href] = true;
      }
    });
  }
  window.__asyncLinks = window.__asyncLinks || {};
  setInterval(checkForLinks, 100);
  checkForLinks();
})()
"#;

const COLLECT_BLOCKING_TAGS_SRC: &str = r#"
(function collectTagsThatBlockFirstPaint() {
  return new Promise((resolve, reject) => {
    try {
      const tagList = [...document.querySelectorAll('link, head script[src]')]
        .filter(tag => {
          if (tag.tagName === 'SCRIPT') {
            return !tag.hasAttribute('async') &&
                !tag.hasAttribute('defer') &&
                !/^data:/.test(tag.src);
          }
          const blockingStylesheet = (tag.rel === 'stylesheet' &&
              window.matchMedia(tag.media).matches && !tag.disabled);
          const blockingImport = tag.rel === 'import' && !tag.hasAttribute('async');
          return blockingStylesheet || blockingImport;
        })
        .map(tag => {
          return {
            tagName: tag.tagName,
            url: tag.tagName === 'LINK' ? tag.href : tag.src,
            rel: tag.rel,
            media: tag.media,
            disabled: tag.disabled
          };
        })
        .filter(tag => !(window.__asyncLinks || {})[tag.url]);
      resolve(tagList);
    } catch (e) {
      reject(new Error('Unable to gather scripts/stylesheets/imports: ' + e.message));
    }
  });
})()
"#;

const FINAL_URL_SRC: &str = "window.location.href";

/// Look up a script payload by name.
pub fn get(name: &str) -> Option<&'static str> {
    match name {
        SAVE_ASYNC_LINKS => Some(SAVE_ASYNC_LINKS_SRC),
        COLLECT_BLOCKING_TAGS => Some(COLLECT_BLOCKING_TAGS_SRC),
        FINAL_URL => Some(FINAL_URL_SRC),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_resolves_known_names() {
        assert!(get(SAVE_ASYNC_LINKS).is_some());
        assert!(get(COLLECT_BLOCKING_TAGS).is_some());
        assert!(get(FINAL_URL).is_some());
        assert!(get("no-such-script").is_none());
    }

    #[test]
    fn payloads_are_self_invoking_or_expressions() {
        // The session evaluates payloads as single expressions; a stray
        // trailing statement would change the returned value.
        assert!(get(SAVE_ASYNC_LINKS).unwrap().trim_end().ends_with(")()"));
        assert!(get(COLLECT_BLOCKING_TAGS).unwrap().trim_end().ends_with(")()"));
    }
}
