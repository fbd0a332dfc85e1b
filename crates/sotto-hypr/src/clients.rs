use serde::Deserialize;

use sotto_foundation::WmError;

use crate::dispatch::hyprctl_stdout;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WorkspaceRef {
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Client {
    pub address: String,
    pub class: String,
    pub title: String,
    pub workspace: WorkspaceRef,
}

/// `hyprctl clients -j`. A failing query yields an empty list rather than
/// an error; callers treat "no clients" and "no compositor" the same way.
pub async fn clients() -> Vec<Client> {
    match hyprctl_stdout(&["clients", "-j"]).await {
        Ok(json) => parse_clients(&json).unwrap_or_else(|e| {
            tracing::warn!("malformed client list: {}", e);
            Vec::new()
        }),
        Err(e) => {
            tracing::debug!("client query failed: {}", e);
            Vec::new()
        }
    }
}

pub fn parse_clients(json: &str) -> Result<Vec<Client>, WmError> {
    Ok(serde_json::from_str(json)?)
}

pub async fn active_window_address() -> Result<String, WmError> {
    #[derive(Deserialize)]
    struct ActiveWindow {
        #[serde(default)]
        address: String,
    }
    let json = hyprctl_stdout(&["activewindow", "-j"]).await?;
    let active: ActiveWindow = serde_json::from_str(&json)?;
    let address = active.address.trim().to_string();
    if address.is_empty() {
        Err(WmError::NoActiveWindow)
    } else {
        Ok(address)
    }
}

pub async fn active_workspace_name() -> Option<String> {
    #[derive(Deserialize)]
    struct ActiveWorkspace {
        #[serde(default)]
        name: String,
    }
    let json = hyprctl_stdout(&["activeworkspace", "-j"]).await.ok()?;
    let ws: ActiveWorkspace = serde_json::from_str(&json).ok()?;
    let name = ws.name.trim().to_string();
    (!name.is_empty()).then_some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_list_parses_the_hyprctl_shape() {
        let json = r#"[
            {
                "address": "0x55cc",
                "class": "ghostty",
                "title": "~",
                "workspace": {"id": 3, "name": "3"},
                "floating": false
            },
            {
                "address": "0x55dd",
                "class": "brave-browser",
                "title": "Search",
                "workspace": {"id": 1, "name": "1"}
            }
        ]"#;
        let clients = parse_clients(json).unwrap();
        assert_eq!(clients.len(), 2);
        assert_eq!(clients[0].class, "ghostty");
        assert_eq!(clients[0].workspace.name, "3");
        assert_eq!(clients[1].address, "0x55dd");
    }

    #[test]
    fn missing_fields_default_instead_of_failing() {
        let json = r#"[{"address": "0xab"}]"#;
        let clients = parse_clients(json).unwrap();
        assert_eq!(clients[0].address, "0xab");
        assert_eq!(clients[0].class, "");
        assert_eq!(clients[0].workspace.name, "");
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(parse_clients("not json").is_err());
        assert!(parse_clients("{}").is_err()); // object, not array
    }
}
