/*!
Program images and the `.maq` loader.

A program image is a load origin plus a flat sequence of guest words; the
kernel copies `words[i]` into guest memory at `origin + i`. Images come from
`.maq` files, a plain text format produced for the course machine:

- `;` starts a comment that runs to end of line; blank lines are ignored
- the first datum is the load origin
- every following datum is one image word, any number per line

Example:

```text
; interrupt handler stub
10
19          ; KCALL
17 14       ; JNZ 14
20          ; RETI
1           ; HALT
```

`ProgramLoader` is the seam between the kernel and program storage: the
binary uses `FileLoader` over a directory of `.maq` files, while tests and
embedded setups use `MapLoader` with in-memory images.
*/

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::err::MachineError;

/// A loaded program image: origin address plus contents.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Program {
    origin: i32,
    words: Vec<i32>,
}

impl Program {
    pub fn new(origin: i32, words: Vec<i32>) -> Self {
        Self { origin, words }
    }

    /// Address the first word loads at.
    #[inline]
    pub fn origin(&self) -> i32 {
        self.origin
    }

    /// Image contents, in load order.
    #[inline]
    pub fn words(&self) -> &[i32] {
        &self.words
    }

    /// Image length in words.
    #[inline]
    pub fn len(&self) -> usize {
        self.words.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// One past the last loaded address.
    #[inline]
    pub fn end(&self) -> i32 {
        self.origin + self.words.len() as i32
    }

    /// Parse the `.maq` text format. `name` is used only for error messages.
    pub fn from_maq_str(name: &str, text: &str) -> Result<Self, MachineError> {
        let bad = |reason: String| MachineError::BadProgram {
            name: name.to_string(),
            reason,
        };

        let mut data = Vec::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = match line.split_once(';') {
                Some((code, _comment)) => code,
                None => line,
            };
            for token in line.split_whitespace() {
                let word: i32 = token
                    .parse()
                    .map_err(|_| bad(format!("line {}: bad word '{}'", lineno + 1, token)))?;
                data.push(word);
            }
        }

        let mut it = data.into_iter();
        let origin = it.next().ok_or_else(|| bad("empty image".to_string()))?;
        if origin < 0 {
            return Err(bad(format!("negative load origin {origin}")));
        }
        let words: Vec<i32> = it.collect();
        if words.is_empty() {
            return Err(bad("image has an origin but no words".to_string()));
        }
        Ok(Self { origin, words })
    }

    /// Read and parse a `.maq` file.
    pub fn from_maq_file<P: AsRef<Path>>(path: P) -> Result<Self, MachineError> {
        let path = path.as_ref();
        let name = path.display().to_string();
        let text = fs::read_to_string(path).map_err(|source| MachineError::ProgramIo {
            name: name.clone(),
            source,
        })?;
        Self::from_maq_str(&name, &text)
    }
}

/// Source of program images, keyed by the names guest processes spawn with.
pub trait ProgramLoader {
    fn load(&self, name: &str) -> Result<Program, MachineError>;
}

/// Loads `.maq` files from a directory. The production loader.
pub struct FileLoader {
    dir: PathBuf,
}

impl FileLoader {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }
}

impl ProgramLoader for FileLoader {
    fn load(&self, name: &str) -> Result<Program, MachineError> {
        // Guest-supplied names are plain file names; keep lookups inside the
        // program directory.
        if name.contains('/') || name.contains('\\') {
            return Err(MachineError::BadProgram {
                name: name.to_string(),
                reason: "program names must not contain path separators".to_string(),
            });
        }
        Program::from_maq_file(self.dir.join(name))
    }
}

/// In-memory loader for tests and embedded program sets.
#[derive(Default)]
pub struct MapLoader {
    programs: HashMap<String, Program>,
}

impl MapLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, program: Program) -> &mut Self {
        self.programs.insert(name.to_string(), program);
        self
    }
}

impl ProgramLoader for MapLoader {
    fn load(&self, name: &str) -> Result<Program, MachineError> {
        self.programs
            .get(name)
            .cloned()
            .ok_or_else(|| MachineError::BadProgram {
                name: name.to_string(),
                reason: "no such program".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_origin_words_and_comments() {
        let text = "; stub\n10\n19 ; KCALL\n17 14\n20\n1\n";
        let p = Program::from_maq_str("stub", text).expect("parse");
        assert_eq!(p.origin(), 10);
        assert_eq!(p.words(), &[19, 17, 14, 20, 1]);
        assert_eq!(p.len(), 5);
        assert_eq!(p.end(), 15);
    }

    #[test]
    fn several_words_per_line() {
        let p = Program::from_maq_str("p", "100 1 2 3\n4 5").expect("parse");
        assert_eq!(p.origin(), 100);
        assert_eq!(p.words(), &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn rejects_malformed_images() {
        assert!(Program::from_maq_str("p", "").is_err());
        assert!(Program::from_maq_str("p", "; only comments\n").is_err());
        assert!(Program::from_maq_str("p", "100").is_err()); // origin, no words
        assert!(Program::from_maq_str("p", "-5 1 2").is_err()); // negative origin
        assert!(Program::from_maq_str("p", "100 1 xyzzy 2").is_err());
    }

    #[test]
    fn map_loader_round_trip() {
        let mut loader = MapLoader::new();
        loader.insert("init.maq", Program::new(100, vec![0, 0]));
        let p = loader.load("init.maq").expect("load");
        assert_eq!(p.origin(), 100);
        assert!(loader.load("missing.maq").is_err());
    }

    #[test]
    fn file_loader_rejects_path_separators() {
        let loader = FileLoader::new("demos");
        assert!(loader.load("../etc/passwd").is_err());
    }
}
