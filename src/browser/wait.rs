//! JavaScript expressions that wait for an element after navigation.
//!
//! Each expression evaluates to a `Promise<boolean>`: `true` once the condition
//! holds, `false` after `timeoutMs`. Existence checks rely on a
//! `MutationObserver` alone. Visibility checks add 100 ms polling because CSS
//! rule changes (media queries, animations) do not produce mutations. Plain
//! `#id` selectors take a `getElementById` fast path.

use std::sync::OnceLock;

use regex::Regex;

/// What the awaited element must look like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// The element exists.
    Present,
    /// The element exists and is rendered with a non-empty box.
    Visible,
    /// The element is absent or not rendered.
    Hidden,
}

fn id_selector() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^#[^\s.:\[\]>+~,()]+$").ok())
        .as_ref()
}

/// Returns the bare id when `selector` is a plain `#id` selector.
pub fn plain_id(selector: &str) -> Option<&str> {
    if id_selector().is_some_and(|re| re.is_match(selector)) {
        Some(&selector[1..])
    } else {
        None
    }
}

fn js_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

const IS_VISIBLE: &str = r#"
  const isVisible = (el) => {
    if (!el) return false;
    const style = window.getComputedStyle(el);
    if (style.display === 'none') return false;
    if (style.visibility === 'hidden' || style.visibility === 'collapse') return false;
    if (style.opacity === '0') return false;
    const rect = el.getBoundingClientRect();
    if (rect.width === 0 || rect.height === 0) return false;
    return true;
  };"#;

/// Builds the wait expression for `selector`.
pub fn wait_expression(selector: &str, timeout_ms: u32, visibility: Visibility) -> String {
    match (visibility, plain_id(selector)) {
        (Visibility::Present, Some(id)) => present_by_id(id, timeout_ms),
        (Visibility::Present, None) => present_by_selector(selector, timeout_ms),
        (v, Some(id)) => visibility_by_id(id, timeout_ms, v),
        (v, None) => visibility_by_selector(selector, timeout_ms, v),
    }
}

fn present_by_id(id: &str, timeout_ms: u32) -> String {
    format!(
        r#"(function(){{
  const id = {id}; const timeoutMs = {timeout_ms};
  return new Promise((resolve) => {{
    if (document.getElementById(id)) return requestAnimationFrame(() => resolve(true));
    let obs;
    const done = (v) => {{ try {{ obs && obs.disconnect(); }} catch(e){{}} requestAnimationFrame(() => resolve(v)); }};
    obs = new MutationObserver(recs => {{
      for (const m of recs) {{
        if (m.type === 'attributes' && m.attributeName === 'id' && m.target.id === id) {{ return done(true); }}
        if (m.type === 'childList') for (const n of m.addedNodes) {{
          if (n.nodeType === 1) {{
            if (n.id === id) return done(true);
            if (n.querySelector && n.querySelector('#' + CSS.escape(id))) return done(true);
          }}
        }}
      }}
    }});
    obs.observe(document, {{subtree:true, childList:true, attributes:true, attributeFilter:['id']}});
    setTimeout(() => done(false), timeoutMs);
  }});
}})()"#,
        id = js_string(id),
    )
}

fn present_by_selector(selector: &str, timeout_ms: u32) -> String {
    format!(
        r#"(function(){{
  const selector = {selector}; const timeoutMs = {timeout_ms};
  return new Promise((resolve) => {{
    if (document.querySelector(selector)) return requestAnimationFrame(() => resolve(true));
    let obs;
    const done = (v) => {{ try {{ obs && obs.disconnect(); }} catch(e){{}} requestAnimationFrame(() => resolve(v)); }};
    obs = new MutationObserver(() => {{ if (document.querySelector(selector)) done(true); }});
    obs.observe(document, {{subtree:true, childList:true, attributes:true}});
    setTimeout(() => done(false), timeoutMs);
  }});
}})()"#,
        selector = js_string(selector),
    )
}

fn check_element(visibility: Visibility) -> &'static str {
    match visibility {
        Visibility::Hidden => "const checkElement = (el) => !el || !isVisible(el);",
        _ => "const checkElement = (el) => el && isVisible(el);",
    }
}

fn visibility_by_id(id: &str, timeout_ms: u32, visibility: Visibility) -> String {
    format!(
        r#"(function(){{
  const id = {id}; const timeoutMs = {timeout_ms};
  {IS_VISIBLE}
  {check}
  return new Promise((resolve) => {{
    if (checkElement(document.getElementById(id))) return requestAnimationFrame(() => resolve(true));
    let obs, pollInterval;
    const done = (v) => {{
      try {{ obs && obs.disconnect(); }} catch(e){{}}
      if (pollInterval) clearInterval(pollInterval);
      requestAnimationFrame(() => resolve(v));
    }};
    const check = () => {{ if (checkElement(document.getElementById(id))) done(true); }};
    obs = new MutationObserver(check);
    obs.observe(document, {{subtree:true, childList:true, attributes:true, attributeFilter:['id', 'style', 'class']}});
    pollInterval = setInterval(check, 100);
    setTimeout(() => done(false), timeoutMs);
  }});
}})()"#,
        id = js_string(id),
        check = check_element(visibility),
    )
}

fn visibility_by_selector(selector: &str, timeout_ms: u32, visibility: Visibility) -> String {
    format!(
        r#"(function(){{
  const selector = {selector}; const timeoutMs = {timeout_ms};
  {IS_VISIBLE}
  {check}
  return new Promise((resolve) => {{
    if (checkElement(document.querySelector(selector))) return requestAnimationFrame(() => resolve(true));
    let obs, pollInterval;
    const done = (v) => {{
      try {{ obs && obs.disconnect(); }} catch(e){{}}
      if (pollInterval) clearInterval(pollInterval);
      requestAnimationFrame(() => resolve(v));
    }};
    const check = () => {{ if (checkElement(document.querySelector(selector))) done(true); }};
    obs = new MutationObserver(check);
    obs.observe(document, {{subtree:true, childList:true, attributes:true, attributeFilter:['style', 'class']}});
    pollInterval = setInterval(check, 100);
    setTimeout(() => done(false), timeoutMs);
  }});
}})()"#,
        selector = js_string(selector),
        check = check_element(visibility),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_ids_take_the_fast_path() {
        assert_eq!(plain_id("#ready"), Some("ready"));
        assert_eq!(plain_id("#my-id_2"), Some("my-id_2"));
        assert_eq!(plain_id("#id.class"), None);
        assert_eq!(plain_id("#id > span"), None);
        assert_eq!(plain_id("div#id"), None);
        assert_eq!(plain_id("#"), None);
    }

    #[test]
    fn selectors_are_embedded_as_string_literals() {
        let expr = wait_expression(r#"div[data-x="a'b"]"#, 500, Visibility::Present);
        assert!(expr.contains(r#"const selector = "div[data-x=\"a'b\"]";"#));
        assert!(expr.contains("const timeoutMs = 500;"));
        assert!(!expr.contains("setInterval"));
    }

    #[test]
    fn visibility_waits_poll_and_pick_the_right_check() {
        let visible = wait_expression("#app", 1000, Visibility::Visible);
        assert!(visible.contains("getElementById(id)"));
        assert!(visible.contains("el && isVisible(el)"));
        assert!(visible.contains("setInterval(check, 100)"));

        let hidden = wait_expression(".spinner", 1000, Visibility::Hidden);
        assert!(hidden.contains("!el || !isVisible(el)"));
        assert!(hidden.contains("querySelector(selector)"));
    }
}
