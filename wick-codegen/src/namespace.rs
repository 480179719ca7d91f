/// Names of intermediate tensors
///
/// Factorization of a term introduces intermediate tensors `I{N}`,
/// and the active part of a term is read from a density tensor `Gamma{N}`.
/// This works as a simple counter for each of them,
/// and is shared by every tree compiled into one program
/// so that the names never collide.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Namespace {
    intermediate: usize,
    gamma: usize,
}

impl Namespace {
    /// Create new namespace
    pub fn init() -> Self {
        Namespace {
            intermediate: 0,
            gamma: 0,
        }
    }

    /// Issue new intermediate number
    pub fn new_intermediate(&mut self) -> usize {
        let n = self.intermediate;
        self.intermediate += 1;
        n
    }

    /// Issue new Gamma number
    pub fn new_gamma(&mut self) -> usize {
        let n = self.gamma;
        self.gamma += 1;
        n
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn counters_are_independent() {
        let mut ns = Namespace::init();
        assert_eq!(ns.new_intermediate(), 0);
        assert_eq!(ns.new_intermediate(), 1);
        assert_eq!(ns.new_gamma(), 0);
        assert_eq!(ns.new_intermediate(), 2);
    }
}
