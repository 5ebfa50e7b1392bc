//! Convenience macros for plugin development.

/// Builds a `HookPayload` from key/value pairs.
///
/// # Example
/// ```rust,ignore
/// let mut payload = hook_payload!({
///     "content_id" => json!("abc-123"),
///     "slug" => json!("hello-world"),
/// });
/// registry.hooks().emit(events::CONTENT_SAVE, &mut payload).await?;
/// ```
#[macro_export]
macro_rules! hook_payload {
    () => {
        $crate::hooks::definitions::HookPayload::new()
    };
    ({ $($key:expr => $value:expr),* $(,)? }) => {{
        let mut payload = $crate::hooks::definitions::HookPayload::new();
        $(
            payload.data.insert($key.to_string(), $value);
        )*
        payload
    }};
    (actor: $actor:expr, { $($key:expr => $value:expr),* $(,)? }) => {{
        let mut payload = $crate::hooks::definitions::HookPayload::new().with_actor($actor);
        $(
            payload.data.insert($key.to_string(), $value);
        )*
        payload
    }};
}

/// Builds a `ConfigMap` from key/value pairs.
///
/// ```rust,ignore
/// let config = config_map! { "ttl" => json!(60), "enabled" => json!(true) };
/// ```
#[macro_export]
macro_rules! config_map {
    ($($key:expr => $value:expr),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut map = $crate::descriptor::ConfigMap::new();
        $(
            map.insert($key.to_string(), $value);
        )*
        map
    }};
}
