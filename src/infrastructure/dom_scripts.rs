//! 页面侧脚本
//!
//! 每个脚本都返回一个信封对象：
//! `{ ok }` / `{ stale: true }` / `{ intercepted }` / `{ notInteractable: true }` / `{ error }`。
//! 元素通过 `window.__clipcut` 注册表按编号引用，编号起点取当前时间，
//! 页面刷新后旧编号不会与新元素撞号。每次查找前先清掉已经脱离文档的登记项。

use serde_json::Value as JsonValue;

use crate::infrastructure::document::{ElementHandle, ElementScope};
use crate::models::Selector;

const PRELUDE: &str = r#"
const R = window.__clipcut || (window.__clipcut = { seq: Date.now() * 1000, byId: new Map() });
const reg = (el) => {
  if (!el.__clipcutId) { el.__clipcutId = ++R.seq; R.byId.set(el.__clipcutId, el); }
  return el.__clipcutId;
};
const sweep = () => {
  for (const [id, el] of R.byId) if (!el.isConnected) R.byId.delete(id);
};
const get = (id) => {
  const el = R.byId.get(id);
  if (!el || !el.isConnected) { R.byId.delete(id); return null; }
  return el;
};
const visible = (el) => {
  const s = window.getComputedStyle(el);
  if (s.display === 'none' || s.visibility === 'hidden') return false;
  return el.getClientRects().length > 0;
};
const query = (kind, expr, root) => {
  if (kind === 'xpath') {
    const snap = document.evaluate(expr, root, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);
    const out = [];
    for (let i = 0; i < snap.snapshotLength; i++) {
      const n = snap.snapshotItem(i);
      if (n.nodeType === 1) out.push(n);
    }
    return out;
  }
  return Array.from(root.querySelectorAll(expr));
};
const setValue = (el, v) => {
  const d = Object.getOwnPropertyDescriptor(Object.getPrototypeOf(el), 'value');
  if (d && d.set) d.set.call(el, v); else el.value = v;
};
const describe = (el) => {
  let s = el.tagName.toLowerCase();
  if (el.id) s += '#' + el.id;
  if (typeof el.className === 'string' && el.className.trim()) {
    s += '.' + el.className.trim().split(/\s+/).slice(0, 2).join('.');
  }
  return s;
};
"#;

fn wrap(body: &str) -> String {
    format!(
        "(() => {{\n{}\ntry {{\n{}\n}} catch (e) {{ return {{ error: String((e && e.message) || e) }}; }}\n}})()",
        PRELUDE, body
    )
}

fn js_string(s: &str) -> String {
    JsonValue::from(s).to_string()
}

fn js_scope(scope: ElementScope) -> String {
    match scope {
        ElementScope::Document => "null".to_string(),
        ElementScope::Within(handle) => handle.id().to_string(),
    }
}

fn with_element(element: ElementHandle, body: &str) -> String {
    let prefix = format!(
        "const el = get({}); if (!el) return {{ stale: true }};\n",
        element.id()
    );
    wrap(&(prefix + body))
}

fn with_root(scope: ElementScope, body: &str) -> String {
    let prefix = format!(
        "const scopeId = {}; const root = scopeId === null ? document : get(scopeId);\n\
         if (!root) return {{ stale: true }};\n",
        js_scope(scope)
    );
    wrap(&(prefix + body))
}

fn matches(selector: &Selector) -> String {
    format!(
        "const found = query({}, {}, root);\n",
        js_string(selector.kind()),
        js_string(selector.expression())
    )
}

pub fn ready_state() -> String {
    wrap("return { ok: document.readyState === 'complete' };")
}

pub fn find_displayed(selector: &Selector, scope: ElementScope) -> String {
    with_root(
        scope,
        &("sweep();\n".to_string() + &matches(selector) + "return { ok: found.filter(visible).map(reg) };"),
    )
}

pub fn count(selector: &Selector, scope: ElementScope) -> String {
    with_root(scope, &(matches(selector) + "return { ok: found.length };"))
}

pub fn scroll_into_view(element: ElementHandle) -> String {
    with_element(
        element,
        "el.scrollIntoView({ block: 'center', inline: 'center' });\nreturn { ok: true };",
    )
}

/// 元素中心坐标；中心点被别的元素盖住时返回遮挡者
pub fn click_point(element: ElementHandle) -> String {
    with_element(
        element,
        r#"
if (el.disabled) return { notInteractable: true };
const r = el.getBoundingClientRect();
if (r.width === 0 || r.height === 0) return { notInteractable: true };
const x = r.left + r.width / 2, y = r.top + r.height / 2;
const top = document.elementFromPoint(x, y);
if (!top) return { notInteractable: true };
if (top !== el && !el.contains(top)) return { intercepted: describe(top) };
return { ok: { x, y } };
"#,
    )
}

pub fn synthetic_click(element: ElementHandle) -> String {
    with_element(
        element,
        r#"
if (typeof el.click === 'function') el.click();
else el.dispatchEvent(new MouseEvent('click', { bubbles: true, cancelable: true, view: window }));
return { ok: true };
"#,
    )
}

pub fn focus_and_clear(element: ElementHandle) -> String {
    with_element(
        element,
        r#"
if (el.disabled || el.readOnly) return { notInteractable: true };
el.focus();
if ('value' in el) {
  setValue(el, '');
  el.dispatchEvent(new Event('input', { bubbles: true }));
} else if (el.isContentEditable) {
  el.textContent = '';
}
return { ok: true };
"#,
    )
}

pub fn set_value(element: ElementHandle, text: &str) -> String {
    let body = format!(
        r#"
const text = {};
if ('value' in el) {{ el.focus(); setValue(el, text); }}
else if (el.isContentEditable) {{ el.textContent = text; }}
else return {{ notInteractable: true }};
el.dispatchEvent(new Event('input', {{ bubbles: true }}));
el.dispatchEvent(new Event('change', {{ bubbles: true }}));
el.blur();
return {{ ok: true }};
"#,
        js_string(text)
    );
    with_element(element, &body)
}

pub fn read_value(element: ElementHandle) -> String {
    with_element(
        element,
        "return { ok: ('value' in el) ? String(el.value) : (el.isContentEditable ? el.textContent : null) };",
    )
}

pub fn text(element: ElementHandle) -> String {
    with_element(
        element,
        "return { ok: (el.innerText || el.textContent || '').trim() };",
    )
}

pub fn attribute(element: ElementHandle, name: &str) -> String {
    with_element(
        element,
        &format!("return {{ ok: el.getAttribute({}) }};", js_string(name)),
    )
}

pub fn focus(element: ElementHandle) -> String {
    with_element(element, "el.focus();\nreturn { ok: true };")
}

pub fn enable_inputs(scope: ElementScope) -> String {
    with_root(
        scope,
        r#"
let n = 0;
root.querySelectorAll('input, textarea').forEach((i) => {
  if (i.disabled || i.readOnly || i.hasAttribute('readonly')) {
    i.disabled = false;
    i.readOnly = false;
    i.removeAttribute('disabled');
    i.removeAttribute('readonly');
    n++;
  }
});
return { ok: n };
"#,
    )
}
