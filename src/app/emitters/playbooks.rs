use crate::domain::model::Artifact;
use crate::domain::ports::{DeploymentPlan, ManifestEmitter, ServiceUnit};
use crate::utils::error::Result;

pub const DEPLOY_PLAYBOOK: &str = "ansible/_05_deploy_services.yml";

/// One playbook per host that received services, plus the aggregate playbook
/// importing them in host deploy order.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaybookEmitter;

fn indent(text: &str, width: usize) -> String {
    let pad = " ".repeat(width);
    text.lines()
        .map(|line| format!("{}{}\n", pad, line))
        .collect()
}

fn play(unit: &ServiceUnit<'_>) -> Result<String> {
    let service = serde_yaml::to_string(unit.service)?;
    Ok(format!(
        "- name: Run {svc} on {host}\n  \
         hosts: {host}\n  \
         become: false\n  \
         gather_facts: true\n  \
         vars:\n    \
         service:\n\
         {service}  \
         roles:\n    \
         - {svc}\n",
        svc = unit.service.name,
        host = unit.host.name,
        service = indent(&service, 6),
    ))
}

fn host_playbook(units: &[&ServiceUnit<'_>]) -> Result<String> {
    let mut out = String::from("---\n");
    for unit in units {
        out.push_str(&play(unit)?);
    }
    Ok(out)
}

fn deploy_playbook(hosts: &[&str]) -> String {
    if hosts.is_empty() {
        return "---\n[]\n".to_string();
    }
    let mut out = String::from("---\n");
    for host in hosts {
        out.push_str(&format!("- import_playbook: {}.yml\n", host));
    }
    out
}

impl ManifestEmitter for PlaybookEmitter {
    fn name(&self) -> &str {
        "playbooks"
    }

    fn emit(&self, plan: &DeploymentPlan<'_>) -> Result<Vec<Artifact>> {
        let hosts = plan.deployed_hosts();
        let mut artifacts = Vec::with_capacity(hosts.len() + 1);
        for host in &hosts {
            let units = plan.services_on(host);
            artifacts.push(Artifact::new(
                format!("ansible/{}.yml", host),
                host_playbook(&units)?,
            ));
        }
        artifacts.push(Artifact::new(DEPLOY_PLAYBOOK, deploy_playbook(&hosts)));
        Ok(artifacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::emitters::fixtures;
    use std::path::PathBuf;

    #[test]
    fn test_host_playbooks_follow_deploy_order() {
        let model = fixtures::model();
        let contexts = fixtures::contexts(&model);
        let order: Vec<String> = vec!["postgres".into(), "api".into()];
        let hosts: Vec<String> = vec!["data".into(), "edge".into()];
        let plan = fixtures::plan(&model, &contexts, &order, &hosts);

        let artifacts = PlaybookEmitter.emit(&plan).unwrap();
        let paths: Vec<PathBuf> = artifacts.iter().map(|a| a.path.clone()).collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("ansible/data.yml"),
                PathBuf::from("ansible/edge.yml"),
                PathBuf::from(DEPLOY_PLAYBOOK),
            ]
        );
        assert_eq!(
            artifacts[2].contents,
            "---\n- import_playbook: data.yml\n- import_playbook: edge.yml\n"
        );
        assert_eq!(
            artifacts[0].contents,
            "---\n\
             - name: Run postgres on data\n  \
             hosts: data\n  \
             become: false\n  \
             gather_facts: true\n  \
             vars:\n    \
             service:\n      \
             name: postgres\n      \
             vm: data\n      \
             depends_on: []\n      \
             port: 5432\n  \
             roles:\n    \
             - postgres\n"
        );
    }

    #[test]
    fn test_playbook_is_valid_yaml() {
        let model = fixtures::model();
        let contexts = fixtures::contexts(&model);
        let order: Vec<String> = vec![];
        let hosts: Vec<String> = vec!["edge".into()];
        let plan = fixtures::plan(&model, &contexts, &order, &hosts);

        let artifacts = PlaybookEmitter.emit(&plan).unwrap();
        let parsed: serde_yaml::Value = serde_yaml::from_str(&artifacts[0].contents).unwrap();
        let vars = &parsed[0]["vars"]["service"];
        assert_eq!(vars["name"], serde_yaml::Value::from("api"));
        assert_eq!(vars["labels"]["team"], serde_yaml::Value::from("core"));
        assert_eq!(vars["depends_on"][0], serde_yaml::Value::from("postgres"));
    }

    #[test]
    fn test_no_deployed_hosts_gives_empty_import_list() {
        let model = fixtures::model();
        let contexts = fixtures::contexts(&model);
        let order: Vec<String> = vec![];
        let hosts: Vec<String> = vec!["data".into(), "edge".into()];
        let mut plan = fixtures::plan(&model, &contexts, &order, &hosts);
        plan.deployed.clear();

        let artifacts = PlaybookEmitter.emit(&plan).unwrap();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].contents, "---\n[]\n");
        let parsed: serde_yaml::Value = serde_yaml::from_str(&artifacts[0].contents).unwrap();
        assert!(parsed.as_sequence().unwrap().is_empty());
    }
}
