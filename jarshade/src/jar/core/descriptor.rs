//! Walking class names inside field/method descriptors and generic
//! signatures.
//!
//! Both walkers hand every internal class name to a callback and rebuild
//! the string from the callback's answers. They return `None` when nothing
//! changed or when the input is malformed, so callers can keep the
//! original text in either case.

pub type NameMap<'m> = dyn FnMut(&str) -> Option<String> + 'm;

/// Rewrites class names in a field or method descriptor
/// (`(ILjava/lang/String;)[Lorg/foo/Bar;`).
pub fn map_descriptor(desc: &str, map: &mut NameMap<'_>) -> Option<String> {
    let mut out = String::with_capacity(desc.len() + 16);
    let mut changed = false;
    let mut rest = desc;

    // Outside class names a descriptor only contains `()[` and primitive
    // codes, none of which is `L`
    while let Some(start) = rest.find('L') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let end = after.find(';')?;
        let name = &after[..end];
        out.push('L');
        match map(name) {
            Some(mapped) => {
                changed = true;
                out.push_str(&mapped);
            }
            None => out.push_str(name),
        }
        out.push(';');
        rest = &after[end + 1..];
    }
    out.push_str(rest);

    changed.then_some(out)
}

/// Rewrites class names in a class, method or field generic signature.
pub fn map_signature(sig: &str, map: &mut NameMap<'_>) -> Option<String> {
    let mut walker = SignatureWalker {
        src: sig,
        pos: 0,
        out: String::with_capacity(sig.len() + 16),
        changed: false,
        map,
    };
    walker.signature()?;
    walker.changed.then_some(walker.out)
}

/// Class names in `text`, in order of appearance, when all of it reads as
/// a descriptor or generic signature. Anything else yields no names.
pub fn type_class_names(text: &str) -> Vec<String> {
    let mut names = Vec::new();
    let complete = map_signature(text, &mut |name| {
        names.push(name.to_owned());
        Some(name.to_owned())
    })
    .is_some();
    if complete {
        names
    } else {
        Vec::new()
    }
}

struct SignatureWalker<'a, 'm, 'n> {
    src: &'a str,
    pos: usize,
    out: String,
    changed: bool,
    map: &'m mut NameMap<'n>,
}

impl SignatureWalker<'_, '_, '_> {
    fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    fn copy_byte(&mut self) -> Option<u8> {
        let b = self.peek()?;
        // Delimiters are ASCII, identifiers go through `take_until`
        self.out.push(b as char);
        self.pos += 1;
        Some(b)
    }

    fn expect(&mut self, expected: u8) -> Option<()> {
        (self.copy_byte()? == expected).then_some(())
    }

    /// Slice up to (not including) the first of `stops`
    fn take_until(&mut self, stops: &[u8]) -> Option<&str> {
        let rest = &self.src.as_bytes()[self.pos..];
        let len = rest.iter().position(|b| stops.contains(b))?;
        let ident = &self.src[self.pos..self.pos + len];
        self.pos += len;
        Some(ident)
    }

    fn signature(&mut self) -> Option<()> {
        if self.peek() == Some(b'<') {
            self.type_parameters()?;
        }
        if self.peek() == Some(b'(') {
            self.copy_byte();
            while self.peek()? != b')' {
                self.java_type()?;
            }
            self.copy_byte();
            self.java_type()?;
            while self.peek() == Some(b'^') {
                self.copy_byte();
                self.reference_type()?;
            }
        } else {
            // Class signature (superclass + interfaces) or field signature
            while self.peek().is_some() {
                self.reference_type()?;
            }
        }
        (self.pos == self.src.len()).then_some(())
    }

    fn type_parameters(&mut self) -> Option<()> {
        self.expect(b'<')?;
        while self.peek()? != b'>' {
            let ident = self.take_until(b":")?.to_owned();
            self.out.push_str(&ident);
            // Class bound may be empty, interface bounds repeat
            while self.peek() == Some(b':') {
                self.copy_byte();
                if matches!(self.peek(), Some(b'L' | b'T' | b'[')) {
                    self.reference_type()?;
                }
            }
        }
        self.expect(b'>')
    }

    fn java_type(&mut self) -> Option<()> {
        match self.peek()? {
            b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b'V' => {
                self.copy_byte();
                Some(())
            }
            _ => self.reference_type(),
        }
    }

    fn reference_type(&mut self) -> Option<()> {
        match self.peek()? {
            b'L' => self.class_type(),
            b'T' => {
                let var = self.take_until(b";")?.to_owned();
                self.out.push_str(&var);
                self.expect(b';')
            }
            b'[' => {
                self.copy_byte();
                self.java_type()
            }
            _ => None,
        }
    }

    fn class_type(&mut self) -> Option<()> {
        self.expect(b'L')?;
        let name = self.take_until(b"<.;")?.to_owned();
        match (self.map)(&name) {
            Some(mapped) => {
                self.changed = true;
                self.out.push_str(&mapped);
            }
            None => self.out.push_str(&name),
        }
        loop {
            match self.peek()? {
                b'<' => self.type_arguments()?,
                b'.' => {
                    // Inner class suffix is a simple name, kept as is
                    self.copy_byte();
                    let inner = self.take_until(b"<.;")?.to_owned();
                    self.out.push_str(&inner);
                }
                b';' => {
                    self.copy_byte();
                    return Some(());
                }
                _ => return None,
            }
        }
    }

    fn type_arguments(&mut self) -> Option<()> {
        self.expect(b'<')?;
        while self.peek()? != b'>' {
            match self.peek()? {
                b'*' => {
                    self.copy_byte();
                }
                b'+' | b'-' => {
                    self.copy_byte();
                    self.reference_type()?;
                }
                _ => self.reference_type()?,
            }
        }
        self.expect(b'>')
    }
}
