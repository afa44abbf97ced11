use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Client-observed device/runtime context attached to an envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DeviceContext {
    pub platform: Option<String>,
    pub os_version: Option<String>,
    pub app_version: Option<String>,
    pub model: Option<String>,
    pub screen_width: Option<u32>,
    pub screen_height: Option<u32>,
    pub locale: Option<String>,
    pub timezone: Option<String>,
    pub network_type: Option<String>,
    pub sdk_version: Option<String>,
}

/// The event payload. Exactly one variant per envelope.
///
/// Adding a variant means updating three things in this file: the variant
/// itself, `category_and_type`, and `to_serializable_map` — no reflection,
/// no runtime registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    ScreenView {
        screen_name: String,
        previous_screen: Option<String>,
    },
    ScreenExit {
        screen_name: String,
        duration_ms: Option<u64>,
    },
    ButtonTap {
        element_id: String,
        screen_name: Option<String>,
    },
    Swipe {
        element_id: Option<String>,
        direction: String,
    },
    Scroll {
        element_id: Option<String>,
        depth_percent: Option<f64>,
    },
    TextInput {
        element_id: String,
        length: Option<u32>,
    },
    LongPress {
        element_id: String,
    },
    DoubleTap {
        element_id: String,
    },
    UserLogin {
        user_id: String,
        method: Option<String>,
    },
    UserLogout {
        user_id: Option<String>,
    },
    UserSignup {
        user_id: String,
        method: Option<String>,
    },
    UserProfileUpdate {
        user_id: String,
        fields_changed: Vec<String>,
    },
    CommerceProductView {
        product_id: String,
        sku: Option<String>,
        price: Option<f64>,
        currency: Option<String>,
    },
    CommerceAddToCart {
        product_id: String,
        quantity: u32,
        price: Option<f64>,
        currency: Option<String>,
    },
    CommerceRemoveFromCart {
        product_id: String,
        quantity: u32,
    },
    CommerceCheckoutStart {
        cart_id: String,
        item_count: u32,
        total: Option<f64>,
        currency: Option<String>,
    },
    CommerceCheckoutStep {
        cart_id: String,
        step: String,
    },
    CommercePurchaseComplete {
        order_id: String,
        total: f64,
        currency: String,
    },
    CommercePurchaseFailed {
        order_id: Option<String>,
        reason: String,
    },
    SystemAppStart {
        cold_start: bool,
    },
    SystemAppBackground,
    SystemAppForeground,
    SystemAppCrash {
        message: String,
        stack_trace: Option<String>,
    },
    SystemNetworkChange {
        network_type: String,
    },
    SystemPermissionRequest {
        permission: String,
    },
    SystemPermissionResult {
        permission: String,
        granted: bool,
    },
    SystemMemoryWarning {
        level: Option<String>,
    },
    SystemBatteryChange {
        level_percent: Option<f64>,
        charging: Option<bool>,
    },
    CustomEvent {
        event_name: String,
        parameters: Map<String, Value>,
    },
}

impl Payload {
    /// Derive the `(category, type)` pair used for subject routing and the
    /// warehouse's partition columns. Pure, static, exhaustive — no dynamic
    /// dispatch.
    pub fn category_and_type(&self) -> (&'static str, String) {
        match self {
            Payload::ScreenView { .. } => ("screen", "view".to_string()),
            Payload::ScreenExit { .. } => ("screen", "exit".to_string()),
            Payload::ButtonTap { .. } => ("interaction", "button_tap".to_string()),
            Payload::Swipe { .. } => ("interaction", "swipe".to_string()),
            Payload::Scroll { .. } => ("interaction", "scroll".to_string()),
            Payload::TextInput { .. } => ("interaction", "text_input".to_string()),
            Payload::LongPress { .. } => ("interaction", "long_press".to_string()),
            Payload::DoubleTap { .. } => ("interaction", "double_tap".to_string()),
            Payload::UserLogin { .. } => ("user", "login".to_string()),
            Payload::UserLogout { .. } => ("user", "logout".to_string()),
            Payload::UserSignup { .. } => ("user", "signup".to_string()),
            Payload::UserProfileUpdate { .. } => ("user", "profile_update".to_string()),
            Payload::CommerceProductView { .. } => ("commerce", "product_view".to_string()),
            Payload::CommerceAddToCart { .. } => ("commerce", "add_to_cart".to_string()),
            Payload::CommerceRemoveFromCart { .. } => ("commerce", "remove_from_cart".to_string()),
            Payload::CommerceCheckoutStart { .. } => ("commerce", "checkout_start".to_string()),
            Payload::CommerceCheckoutStep { .. } => ("commerce", "checkout_step".to_string()),
            Payload::CommercePurchaseComplete { .. } => {
                ("commerce", "purchase_complete".to_string())
            }
            Payload::CommercePurchaseFailed { .. } => ("commerce", "purchase_failed".to_string()),
            Payload::SystemAppStart { .. } => ("system", "app_start".to_string()),
            Payload::SystemAppBackground => ("system", "app_background".to_string()),
            Payload::SystemAppForeground => ("system", "app_foreground".to_string()),
            Payload::SystemAppCrash { .. } => ("system", "app_crash".to_string()),
            Payload::SystemNetworkChange { .. } => ("system", "network_change".to_string()),
            Payload::SystemPermissionRequest { .. } => {
                ("system", "permission_request".to_string())
            }
            Payload::SystemPermissionResult { .. } => ("system", "permission_result".to_string()),
            Payload::SystemMemoryWarning { .. } => ("system", "memory_warning".to_string()),
            Payload::SystemBatteryChange { .. } => ("system", "battery_change".to_string()),
            Payload::CustomEvent { event_name, .. } => ("custom", sanitize_slug(event_name)),
        }
    }

    /// Flatten this variant into a JSON object for the warehouse's payload
    /// column. Defined alongside the variant so adding a field means
    /// touching one place.
    pub fn to_serializable_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => {
                let mut map = map;
                map.remove("type");
                map
            }
            _ => Map::new(),
        }
    }

    pub fn event_name_if_custom(&self) -> Option<&str> {
        match self {
            Payload::CustomEvent { event_name, .. } => Some(event_name.as_str()),
            _ => None,
        }
    }
}

/// Lowercase, dots/spaces -> underscores. Used for both custom event names
/// and app_id subject sanitization.
pub fn sanitize_slug(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == '.' || c.is_whitespace() { '_' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn screen_view_derives_screen_view() {
        let p = Payload::ScreenView {
            screen_name: "home".into(),
            previous_screen: None,
        };
        assert_eq!(p.category_and_type(), ("screen", "view".to_string()));
    }

    #[test]
    fn custom_event_sanitizes_name() {
        let p = Payload::CustomEvent {
            event_name: "Checkout.Abandoned Cart".into(),
            parameters: Map::new(),
        };
        let (category, ty) = p.category_and_type();
        assert_eq!(category, "custom");
        assert_eq!(ty, "checkout_abandoned_cart");
    }

    #[test]
    fn to_serializable_map_drops_tag() {
        let p = Payload::ButtonTap {
            element_id: "buy-now".into(),
            screen_name: Some("pdp".into()),
        };
        let map = p.to_serializable_map();
        assert!(!map.contains_key("type"));
        assert_eq!(map.get("element_id").unwrap(), "buy-now");
    }
}
