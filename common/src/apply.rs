//! Apply utilities: the only sanctioned way plugins mutate container
//! envelopes. Every helper upserts into an ordered `Vec`
//! by a semantic key: replace in place preserving order if a match is
//! found, otherwise append. Applying the same element twice is a no-op,
//! the foundation every plugin's re-entrancy rests on.

use crate::model::{ContainerPort, EnvVar, VolumeMount};

/// Generic upsert-by-key, shared by every typed helper below so the
/// idempotence/order-preservation proof only has to be made once.
fn upsert_by<T>(items: &mut Vec<T>, item: T, same_key: impl Fn(&T, &T) -> bool) {
    if let Some(slot) = items.iter_mut().find(|existing| same_key(existing, &item)) {
        *slot = item;
    } else {
        items.push(item);
    }
}

/// Env-var key: name.
pub fn upsert_env(env: &mut Vec<EnvVar>, var: EnvVar) {
    upsert_by(env, var, |a, b| a.name == b.name);
}

pub fn upsert_envs(env: &mut Vec<EnvVar>, vars: impl IntoIterator<Item = EnvVar>) {
    for var in vars {
        upsert_env(env, var);
    }
}

/// Container-port key: `(containerPort, name)` — either match wins.
pub fn upsert_port(ports: &mut Vec<ContainerPort>, port: ContainerPort) {
    upsert_by(ports, port, |a, b| {
        a.container_port == b.container_port || (a.name.is_some() && a.name == b.name)
    });
}

/// Volume key: name.
pub fn upsert_volume(
    volumes: &mut Vec<crate::model::Volume>,
    volume: crate::model::Volume,
) {
    upsert_by(volumes, volume, |a, b| a.name == b.name);
}

/// Volume-mount key: mount path.
pub fn upsert_mount(mounts: &mut Vec<VolumeMount>, mount: VolumeMount) {
    upsert_by(mounts, mount, |a, b| a.mount_path == b.mount_path);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Volume;

    fn env(name: &str, value: &str) -> EnvVar {
        EnvVar::new(name, value)
    }

    #[test]
    fn upsert_env_appends_new_name() {
        let mut env_vars = vec![env("A", "1")];
        upsert_env(&mut env_vars, env("B", "2"));
        assert_eq!(env_vars, vec![env("A", "1"), env("B", "2")]);
    }

    #[test]
    fn upsert_env_replaces_in_place() {
        let mut env_vars = vec![env("A", "1"), env("B", "2"), env("C", "3")];
        upsert_env(&mut env_vars, env("B", "99"));
        assert_eq!(env_vars, vec![env("A", "1"), env("B", "99"), env("C", "3")]);
    }

    #[test]
    fn upsert_env_is_idempotent() {
        let mut env_vars = vec![env("A", "1")];
        upsert_env(&mut env_vars, env("B", "2"));
        upsert_env(&mut env_vars, env("B", "2"));
        assert_eq!(env_vars, vec![env("A", "1"), env("B", "2")]);
    }

    #[test]
    fn upsert_port_matches_by_either_field() {
        let mut ports = vec![ContainerPort {
            container_port: 29500,
            name: Some("master".to_string()),
        }];
        upsert_port(
            &mut ports,
            ContainerPort {
                container_port: 29500,
                name: None,
            },
        );
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].name, None);
    }

    #[test]
    fn upsert_volume_preserves_order_on_replace() {
        let mut volumes = vec![
            Volume {
                name: "a".into(),
                source: serde_json::json!({"emptyDir": {}}),
            },
            Volume {
                name: "b".into(),
                source: serde_json::json!({"emptyDir": {}}),
            },
        ];
        upsert_volume(
            &mut volumes,
            Volume {
                name: "a".into(),
                source: serde_json::json!({"configMap": {"name": "ca"}}),
            },
        );
        assert_eq!(volumes[0].name, "a");
        assert_eq!(volumes[1].name, "b");
        assert_eq!(volumes[0].source["configMap"]["name"], "ca");
    }

    #[test]
    fn upsert_mount_keyed_by_path() {
        let mut mounts = vec![VolumeMount {
            name: "old".into(),
            mount_path: "/var/run/trainer".into(),
            read_only: true,
        }];
        upsert_mount(
            &mut mounts,
            VolumeMount {
                name: "new".into(),
                mount_path: "/var/run/trainer".into(),
                read_only: true,
            },
        );
        assert_eq!(mounts.len(), 1);
        assert_eq!(mounts[0].name, "new");
    }
}
