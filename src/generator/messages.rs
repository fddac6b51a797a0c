use std::collections::BTreeSet;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::properties::parse_properties;
use crate::error::{BundlingError, BundlingResult};
use crate::reader::{CLASSPATH_PREFIX, ResourceReaderHandler};
use crate::variant::{LOCALE_VARIANT_TYPE, VariantSet, VariantSets};

use super::{Generator, GeneratorContext, PREFIX_SEPARATOR, ResourceResolver};

const DEFAULT_NAMESPACE: &str = "messages";
const PROPERTIES_EXTENSION: &str = ".properties";

/// Turns `.properties` message bundles into a JavaScript namespace object.
///
/// The mapping `messages:app.messages|app.errors(i18n)[label.|error.]` reads
/// `app/messages*.properties` and `app/errors*.properties`, keeps keys starting with `label.`
/// or `error.`, and publishes them under `i18n`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MessagesGenerator;

#[derive(Debug, PartialEq, Eq)]
struct MessagesRequest<'a> {
  names: Vec<&'a str>,
  namespace: &'a str,
  filters: Vec<&'a str>,
  locale: Option<&'a str>,
}

fn parse_request(path: &str) -> MessagesRequest<'_> {
  let (path, locale) = match path.split_once('@') {
    Some((path, locale)) if !locale.is_empty() => (path, Some(locale)),
    Some((path, _)) => (path, None),
    None => (path, None),
  };

  let mut names_part = path;
  let mut namespace = DEFAULT_NAMESPACE;
  let mut filters = Vec::new();

  if let Some(open) = path.find('[') {
    if let Some(close) = path[open..].find(']') {
      filters = path[open + 1..open + close]
        .split('|')
        .filter(|f| !f.is_empty())
        .collect();
    }
    names_part = &path[..open];
  }
  if let Some(open) = names_part.find('(') {
    if let Some(close) = names_part[open..].find(')') {
      namespace = &names_part[open + 1..open + close];
    }
    names_part = &names_part[..open];
  }

  MessagesRequest {
    names: names_part.split('|').filter(|n| !n.is_empty()).collect(),
    namespace,
    filters,
    locale,
  }
}

fn bundle_base_path(name: &str) -> String {
  name.replace('.', "/")
}

/// `fr_FR_win` → `["", "fr", "fr_FR", "fr_FR_win"]`.
fn locale_chain(locale: Option<&str>) -> Vec<String> {
  let mut chain = vec![String::new()];
  if let Some(locale) = locale.filter(|l| !l.is_empty()) {
    let mut current = String::new();
    for part in locale.split('_') {
      if !current.is_empty() {
        current.push('_');
      }
      current.push_str(part);
      chain.push(current.clone());
    }
  }
  chain
}

fn read_message_file(reader: &dyn ResourceReaderHandler, base: &str, locale: &str) -> Option<String> {
  let file = if locale.is_empty() {
    format!("{base}{PROPERTIES_EXTENSION}")
  } else {
    format!("{base}_{locale}{PROPERTIES_EXTENSION}")
  };
  reader
    .resource(&format!("{CLASSPATH_PREFIX}{file}"))
    .or_else(|_| reader.resource(&format!("/{file}")))
    .ok()
}

fn insert_message(root: &mut Map<String, Value>, key: &str, value: &str) {
  let mut segments: Vec<&str> = key.split('.').collect();
  let Some(last) = segments.pop() else {
    return;
  };

  let mut node = root;
  for segment in segments {
    let entry = node
      .entry(segment.to_string())
      .or_insert_with(|| Value::Object(Map::new()));
    if !entry.is_object() {
      warn!(key, "message key shadows a parent message, keeping the nested keys");
      *entry = Value::Object(Map::new());
    }
    let Value::Object(child) = entry else {
      return;
    };
    node = child;
  }

  if node.get(last).is_some_and(Value::is_object) {
    warn!(key, "message key collides with a message group, skipping it");
    return;
  }
  node.insert(last.to_string(), Value::String(value.to_string()));
}

impl Generator for MessagesGenerator {
  fn resolver(&self) -> ResourceResolver {
    ResourceResolver::prefixed("messages")
  }

  fn create_resource(&self, context: &GeneratorContext<'_>) -> BundlingResult<String> {
    let request = parse_request(context.path);
    if request.names.is_empty() {
      return Err(BundlingError::processing(
        context.requested_path,
        "no message bundle name given",
      ));
    }

    let locale = request.locale.or_else(|| {
      context
        .variants
        .get(LOCALE_VARIANT_TYPE)
        .and_then(|value| value.as_deref())
        .filter(|value| !value.is_empty())
    });

    let mut root = Map::new();
    for name in &request.names {
      let base = bundle_base_path(name);
      let mut found = false;
      for step in locale_chain(locale) {
        let Some(text) = read_message_file(context.reader, &base, &step) else {
          continue;
        };
        found = true;
        debug!(bundle = name, locale = step.as_str(), "loaded message bundle");
        for (key, value) in parse_properties(&text) {
          let included = request.filters.is_empty()
            || request.filters.iter().any(|prefix| key.starts_with(prefix));
          if included {
            insert_message(&mut root, &key, &value);
          }
        }
      }
      if !found {
        return Err(BundlingError::ResourceNotFound {
          path: format!("{base}{PROPERTIES_EXTENSION}"),
        });
      }
    }

    let json = serde_json::to_string(&Value::Object(root))
      .map_err(|err| BundlingError::processing(context.requested_path, err.to_string()))?;
    let namespace = serde_json::to_string(request.namespace)
      .map_err(|err| BundlingError::processing(context.requested_path, err.to_string()))?;
    Ok(format!("(function(root){{root[{namespace}]={json};}})(this);\n"))
  }

  fn variant_types(&self) -> BTreeSet<String> {
    BTreeSet::from([LOCALE_VARIANT_TYPE.to_string()])
  }

  fn available_variants(
    &self,
    path: &str,
    reader: &dyn ResourceReaderHandler,
  ) -> BundlingResult<VariantSets> {
    let request = parse_request(path);
    let mut locales = vec![String::new()];

    for name in &request.names {
      let base = bundle_base_path(name);
      let (dir, stem) = match base.rfind('/') {
        Some(idx) => (&base[..idx], &base[idx + 1..]),
        None => ("", base.as_str()),
      };
      let file_prefix = format!("{stem}_");

      for root in [format!("{CLASSPATH_PREFIX}{dir}"), format!("/{dir}")] {
        let Ok(names) = reader.resource_names(&root) else {
          continue;
        };
        for file in names {
          let locale = file
            .strip_prefix(&file_prefix)
            .and_then(|rest| rest.strip_suffix(PROPERTIES_EXTENSION));
          if let Some(locale) = locale {
            if !locales.iter().any(|known| known == locale) {
              locales.push(locale.to_string());
            }
          }
        }
      }
    }

    let set = VariantSet::new(LOCALE_VARIANT_TYPE, "", locales)?;
    Ok(VariantSets::from([(LOCALE_VARIANT_TYPE.to_string(), set)]))
  }

  fn generation_path(&self, parameter: &str) -> String {
    let path = parameter.replacen(PREFIX_SEPARATOR, "/", 1);
    let path = if path.ends_with('@') {
      path.replace('@', "")
    } else {
      path.replace(['@', '|'], "_")
    };
    format!("{path}.js")
  }
}
