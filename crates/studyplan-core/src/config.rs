use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::locale::Locale;

const RC_ENV_VAR: &str = "STUDYPLANRC";
const RC_FILE_NAME: &str = ".studyplanrc";
const DATA_DIR_NAME: &str = ".studyplan";

#[derive(Debug, Clone)]
pub struct Config {
  map: HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

/// Every recognised key with its
/// built-in value.
const DEFAULTS: [(&str, &str); 10] = [
  ("data.location", "~/.studyplan"),
  ("default.command", "calendar"),
  ("color", "on"),
  ("locale", "nb"),
  ("timer.focus.presets", "25,30,45"),
  ("timer.focus.minutes", "25"),
  ("timer.short_break.minutes", "5"),
  ("timer.long_break.minutes", "15"),
  ("timer.cycles_before_long_break", "4"),
  ("timer.tick_ms", "300")
];

impl Default for Config {
  fn default() -> Self {
    Self {
      map: DEFAULTS
        .iter()
        .map(|(k, v)| {
          (k.to_string(), v.to_string())
        })
        .collect(),
      loaded_files: vec![]
    }
  }
}

impl Config {
  #[tracing::instrument]
  pub fn load(
    rc_flag: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    let source = rc_source(
      rc_flag,
      std::env::var(RC_ENV_VAR).ok(),
      dirs::home_dir()
    );
    match source {
      | Some(path) if path.exists() => {
        info!(rc = %path.display(), "loading rc file");
        cfg.load_file(&path)?;
      }
      | Some(path) if rc_flag.is_some() => {
        return Err(anyhow!(
          "rc file {} does not exist",
          path.display()
        ));
      }
      | _ => {
        debug!("no rc file; using defaults");
      }
    }

    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  /// Strict boolean: unknown spellings
  /// are an error, not `false`.
  pub fn get_bool(
    &self,
    key: &str
  ) -> anyhow::Result<Option<bool>> {
    self
      .map
      .get(key)
      .map(|raw| {
        parse_bool(raw).ok_or_else(|| {
          anyhow!(
            "invalid {key} setting: {raw}"
          )
        })
      })
      .transpose()
  }

  pub fn get_u32(
    &self,
    key: &str
  ) -> anyhow::Result<Option<u32>> {
    self
      .map
      .get(key)
      .map(|raw| {
        raw.trim().parse::<u32>().with_context(
          || {
            format!(
              "config {key} must be a \
               non-negative integer, \
               got: {raw}"
            )
          }
        )
      })
      .transpose()
  }

  pub fn get_u32_list(
    &self,
    key: &str
  ) -> anyhow::Result<Option<Vec<u32>>>
  {
    let Some(raw) = self.map.get(key)
    else {
      return Ok(None);
    };

    raw
      .split(',')
      .map(str::trim)
      .filter(|part| !part.is_empty())
      .map(|part| {
        part.parse::<u32>().with_context(
          || {
            format!(
              "config {key} entry is \
               not an integer: {part}"
            )
          }
        )
      })
      .collect::<anyhow::Result<Vec<_>>>()
      .map(Some)
  }

  pub fn locale(
    &self
  ) -> anyhow::Result<Locale> {
    match self.map.get("locale") {
      | Some(raw) => raw
        .parse()
        .context("invalid locale setting"),
      | None => Ok(Locale::default())
    }
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    if self.loaded_files.contains(&path) {
      return Err(anyhow!(
        "rc file {} is included more \
         than once",
        path.display()
      ));
    }
    let text = fs::read_to_string(&path)
      .with_context(|| {
        format!(
          "failed to read rc file {}",
          path.display()
        )
      })?;
    self.loaded_files.push(path.clone());

    for (idx, raw) in
      text.lines().enumerate()
    {
      let at = || {
        format!(
          "{}:{}",
          path.display(),
          idx + 1
        )
      };
      match classify_rc_line(raw) {
        | Some(RcLine::Blank) => {}
        | Some(RcLine::Include(target)) => {
          let include =
            include_path(&path, target)
              .with_context(|| at())?;
          if include.exists() {
            self.load_file(&include)?;
          } else {
            warn!(
              at = %at(),
              include = %include.display(),
              "included rc file not found"
            );
          }
        }
        | Some(RcLine::Setting(key, value)) => {
          if !is_known_key(key) {
            warn!(at = %at(), key, "unknown rc key");
          }
          trace!(key, value, "rc setting");
          self
            .map
            .insert(key.to_string(), value.to_string());
        }
        | None => {
          return Err(anyhow!(
            "{}: expected `key = value`, \
             got: {raw}",
            at()
          ));
        }
      }
    }

    Ok(())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RcLine<'a> {
  Blank,
  Include(&'a str),
  Setting(&'a str, &'a str)
}

/// `None` for a line that is neither
/// blank, an include, nor `key = value`.
fn classify_rc_line(
  raw: &str
) -> Option<RcLine<'_>> {
  let line = raw
    .split_once('#')
    .map_or(raw, |(before, _)| before)
    .trim();

  if line.is_empty() {
    return Some(RcLine::Blank);
  }
  if let Some(target) =
    line.strip_prefix("include ")
  {
    let target = target.trim();
    return (!target.is_empty())
      .then_some(RcLine::Include(target));
  }

  let (key, value) = line.split_once('=')?;
  let key = key.trim();
  (!key.is_empty())
    .then_some(RcLine::Setting(key, value.trim()))
}

fn is_known_key(key: &str) -> bool {
  DEFAULTS.iter().any(|(k, _)| *k == key)
}

/// `--rc-file`, then `$STUDYPLANRC`
/// (`/dev/null` turns rc loading off),
/// then `~/.studyplanrc`.
fn rc_source(
  flag: Option<&Path>,
  env: Option<String>,
  home: Option<PathBuf>
) -> Option<PathBuf> {
  if let Some(path) = flag {
    return Some(path.to_path_buf());
  }
  match env {
    | Some(raw) if raw == "/dev/null" => None,
    | Some(raw) if !raw.trim().is_empty() => {
      Some(expand_tilde(Path::new(raw.trim())))
    }
    | _ => home.map(|home| home.join(RC_FILE_NAME))
  }
}

#[tracing::instrument(skip(cfg))]
pub fn resolve_data_dir(
  cfg: &Config,
  flag: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = match flag {
    | Some(path) => path.to_path_buf(),
    | None => {
      let configured = cfg
        .get("data.location")
        .unwrap_or_else(|| {
          format!("~/{DATA_DIR_NAME}")
        });
      expand_tilde(Path::new(&configured))
    }
  };

  fs::create_dir_all(&dir).with_context(|| {
    format!(
      "failed to create data directory {}",
      dir.display()
    )
  })?;
  Ok(dir)
}

/// Relative includes resolve against
/// the including file's directory.
fn include_path(
  including: &Path,
  target: &str
) -> anyhow::Result<PathBuf> {
  let target = expand_tilde(Path::new(target));
  if target.is_absolute() {
    return Ok(target);
  }
  including
    .parent()
    .map(|dir| dir.join(&target))
    .ok_or_else(|| {
      anyhow!(
        "cannot resolve include {}",
        target.display()
      )
    })
}

fn expand_tilde(path: &Path) -> PathBuf {
  match (
    path.strip_prefix("~"),
    dirs::home_dir()
  ) {
    | (Ok(rest), Some(home)) => home.join(rest),
    | _ => path.to_path_buf()
  }
}

fn parse_bool(raw: &str) -> Option<bool> {
  match raw
    .trim()
    .to_ascii_lowercase()
    .as_str()
  {
    | "1" | "y" | "yes" | "on" | "true" => {
      Some(true)
    }
    | "0" | "n" | "no" | "off"
    | "false" => Some(false),
    | _ => None
  }
}

#[cfg(test)]
mod tests {
  use std::fs;
  use std::path::PathBuf;

  use tempfile::tempdir;

  use super::{
    Config,
    RcLine,
    classify_rc_line,
    is_known_key,
    rc_source,
    resolve_data_dir
  };
  use crate::locale::Locale;

  #[test]
  fn loads_rc_file_with_include_and_comments()
  {
    let temp = tempdir().expect("tempdir");
    let extra = temp.path().join("timer.rc");
    fs::write(
      &extra,
      "timer.focus.minutes = 45\n"
    )
    .expect("write include");
    let rc = temp.path().join("main.rc");
    fs::write(
      &rc,
      "# study setup\nlocale = en  # english labels\ninclude timer.rc\n\ncolor=off\n"
    )
    .expect("write rc");

    let cfg =
      Config::load(Some(&rc)).expect("load rc");
    assert_eq!(cfg.loaded_files.len(), 2);
    assert_eq!(
      cfg.locale().expect("locale"),
      Locale::English
    );
    assert_eq!(
      cfg
        .get_u32("timer.focus.minutes")
        .expect("parse"),
      Some(45)
    );
    assert_eq!(
      cfg.get_bool("color").expect("bool"),
      Some(false)
    );
    assert_eq!(
      cfg.get("default.command").as_deref(),
      Some("calendar")
    );
  }

  #[test]
  fn rejects_lines_without_equals() {
    let temp = tempdir().expect("tempdir");
    let rc = temp.path().join("bad.rc");
    fs::write(&rc, "locale en\n")
      .expect("write rc");
    assert!(Config::load(Some(&rc)).is_err());
  }

  #[test]
  fn overrides_strip_rc_prefix() {
    let mut cfg = Config::default();
    cfg.apply_overrides([
      (
        "rc.timer.tick_ms".to_string(),
        "500".to_string()
      ),
      (
        "timer.focus.presets".to_string(),
        "20, 40".to_string()
      )
    ]);
    assert_eq!(
      cfg.get_u32("timer.tick_ms").expect("parse"),
      Some(500)
    );
    assert_eq!(
      cfg
        .get_u32_list("timer.focus.presets")
        .expect("parse"),
      Some(vec![20, 40])
    );
  }

  #[test]
  fn non_numeric_values_are_errors() {
    let mut cfg = Config::default();
    cfg.apply_overrides([(
      "timer.tick_ms".to_string(),
      "fast".to_string()
    )]);
    assert!(cfg.get_u32("timer.tick_ms").is_err());
    assert_eq!(
      cfg.get_u32("missing").expect("absent"),
      None
    );
  }

  #[test]
  fn booleans_are_strict() {
    let mut cfg = Config::default();
    cfg.apply_overrides([(
      "color".to_string(),
      "No".to_string()
    )]);
    assert_eq!(
      cfg.get_bool("color").expect("bool"),
      Some(false)
    );

    cfg.apply_overrides([(
      "color".to_string(),
      "sometimes".to_string()
    )]);
    assert!(cfg.get_bool("color").is_err());
    assert_eq!(
      cfg.get_bool("missing").expect("absent"),
      None
    );
  }

  #[test]
  fn include_cycles_are_errors() {
    let temp = tempdir().expect("tempdir");
    let rc = temp.path().join("loop.rc");
    fs::write(&rc, "include loop.rc\n")
      .expect("write rc");
    let err = Config::load(Some(&rc))
      .expect_err("cycle");
    assert!(
      format!("{err:#}")
        .contains("more than once")
    );
  }

  #[test]
  fn missing_rc_flag_file_is_an_error() {
    let temp = tempdir().expect("tempdir");
    let rc = temp.path().join("absent.rc");
    assert!(Config::load(Some(&rc)).is_err());
  }

  #[test]
  fn classifies_rc_lines() {
    assert_eq!(
      classify_rc_line("  # only a comment"),
      Some(RcLine::Blank)
    );
    assert_eq!(
      classify_rc_line("include ~/extra.rc"),
      Some(RcLine::Include("~/extra.rc"))
    );
    assert_eq!(
      classify_rc_line("color = off # plain"),
      Some(RcLine::Setting("color", "off"))
    );
    assert_eq!(classify_rc_line("= off"), None);
    assert_eq!(classify_rc_line("include "), None);
    assert!(is_known_key("timer.tick_ms"));
    assert!(!is_known_key("timer.tickms"));
  }

  #[test]
  fn rc_source_priority() {
    let home = PathBuf::from("/home/student");
    let flag = PathBuf::from("/tmp/flag.rc");
    assert_eq!(
      rc_source(
        Some(&flag),
        Some("/tmp/env.rc".to_string()),
        Some(home.clone())
      ),
      Some(flag.clone())
    );
    assert_eq!(
      rc_source(
        None,
        Some("/tmp/env.rc".to_string()),
        Some(home.clone())
      ),
      Some(PathBuf::from("/tmp/env.rc"))
    );
    assert_eq!(
      rc_source(
        None,
        Some("/dev/null".to_string()),
        Some(home.clone())
      ),
      None
    );
    assert_eq!(
      rc_source(None, None, Some(home)),
      Some(PathBuf::from(
        "/home/student/.studyplanrc"
      ))
    );
    assert_eq!(rc_source(None, None, None), None);
  }

  #[test]
  fn data_dir_flag_wins_and_is_created() {
    let temp = tempdir().expect("tempdir");
    let wanted = temp.path().join("nested/data");
    let dir = resolve_data_dir(
      &Config::default(),
      Some(&wanted)
    )
    .expect("data dir");
    assert_eq!(dir, wanted);
    assert!(dir.is_dir());
  }
}
