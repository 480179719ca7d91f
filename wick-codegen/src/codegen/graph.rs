//! Dependency graph of the emitted tasks
//!
//! Every `add_dep` call written into the driver is recorded here as well,
//! so that the schedule of the generated program can be checked
//! without compiling it.

use indexmap::{IndexMap, IndexSet};

/// What an emitted task touches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInfo {
    /// Queue the task is added to, e.g. `queue` or `energy_queue`
    pub queue: String,
    /// Labels of the input tensors, aliases resolved
    pub reads: Vec<String>,
    /// Label of the output tensor, none for scalar accumulation
    pub writes: Option<String>,
    /// Computes a Gamma tensor from the density matrices
    pub gamma: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Dependency refers to undefined task {0}")]
    UnknownTask(usize),

    #[error("Dependency cycle among tasks {involved:?}")]
    Cycle { involved: Vec<usize> },

    #[error("Task {task} reads {gamma} without depending on task {producer} computing it")]
    MissingGammaDependency {
        task: usize,
        gamma: String,
        producer: usize,
    },
}

#[derive(Debug, Clone, Default)]
pub struct TaskGraph {
    tasks: IndexMap<usize, TaskInfo>,
    /// `(consumer, producer)`, i.e. the consumer waits for the producer
    edges: IndexSet<(usize, usize)>,
}

impl TaskGraph {
    pub fn add_task(&mut self, num: usize, info: TaskInfo) {
        self.tasks.insert(num, info);
    }

    pub fn add_dep(&mut self, consumer: usize, producer: usize) {
        self.edges.insert((consumer, producer));
    }

    pub fn task(&self, num: usize) -> Option<&TaskInfo> {
        self.tasks.get(&num)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn edges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.edges.iter().copied()
    }

    pub fn depends_on(&self, consumer: usize, producer: usize) -> bool {
        self.edges.contains(&(consumer, producer))
    }

    /// Tasks of a queue in the order they are added
    pub fn queue(&self, queue: &str) -> Vec<usize> {
        self.tasks
            .iter()
            .filter(|(_, info)| info.queue == queue)
            .map(|(&num, _)| num)
            .collect()
    }

    /// Check the graph and sort the tasks into levels with Kahn's algorithm
    ///
    /// Tasks in a level depend only on the tasks of the previous levels.
    pub fn validate(&self) -> Result<Vec<Vec<usize>>, GraphError> {
        let mut in_degree: IndexMap<usize, usize> = self.tasks.keys().map(|&n| (n, 0)).collect();
        let mut dependents: IndexMap<usize, Vec<usize>> = IndexMap::new();
        for &(consumer, producer) in &self.edges {
            for n in [consumer, producer] {
                if !self.tasks.contains_key(&n) {
                    return Err(GraphError::UnknownTask(n));
                }
            }
            *in_degree.entry(consumer).or_default() += 1;
            dependents.entry(producer).or_default().push(consumer);
        }

        let gamma: IndexMap<&str, usize> = self
            .tasks
            .iter()
            .filter(|(_, info)| info.gamma)
            .filter_map(|(&n, info)| info.writes.as_deref().map(|label| (label, n)))
            .collect();
        for (&task, info) in &self.tasks {
            for read in &info.reads {
                if let Some(&producer) = gamma.get(read.as_str()) {
                    if producer != task && !self.depends_on(task, producer) {
                        return Err(GraphError::MissingGammaDependency {
                            task,
                            gamma: read.clone(),
                            producer,
                        });
                    }
                }
            }
        }

        let mut levels = Vec::new();
        let mut current: Vec<usize> = in_degree
            .iter()
            .filter(|(_, &d)| d == 0)
            .map(|(&n, _)| n)
            .collect();
        let mut processed = 0;
        while !current.is_empty() {
            current.sort_unstable();
            processed += current.len();
            let mut next = Vec::new();
            for n in &current {
                for dep in dependents.get(n).into_iter().flatten() {
                    if let Some(degree) = in_degree.get_mut(dep) {
                        *degree -= 1;
                        if *degree == 0 {
                            next.push(*dep);
                        }
                    }
                }
            }
            levels.push(std::mem::replace(&mut current, next));
        }

        if processed != self.tasks.len() {
            let involved = in_degree
                .iter()
                .filter(|(_, &d)| d > 0)
                .map(|(&n, _)| n)
                .collect();
            return Err(GraphError::Cycle { involved });
        }
        Ok(levels)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn info(queue: &str, reads: &[&str], writes: &str, gamma: bool) -> TaskInfo {
        TaskInfo {
            queue: queue.to_string(),
            reads: reads.iter().map(|s| s.to_string()).collect(),
            writes: Some(writes.to_string()),
            gamma,
        }
    }

    #[test]
    fn levels() -> Result<(), GraphError> {
        let mut graph = TaskGraph::default();
        graph.add_task(0, info("queue", &[], "r", false));
        graph.add_task(1, info("queue", &["rdm1"], "Gamma0", true));
        graph.add_task(2, info("queue", &["I0"], "r", false));
        graph.add_task(3, info("queue", &["Gamma0", "t1"], "I0", false));
        graph.add_dep(2, 0);
        graph.add_dep(2, 3);
        graph.add_dep(3, 1);
        assert_eq!(graph.validate()?, vec![vec![0, 1], vec![3], vec![2]]);
        assert_eq!(graph.queue("queue"), vec![0, 1, 2, 3]);
        Ok(())
    }

    #[test]
    fn cycle() {
        let mut graph = TaskGraph::default();
        graph.add_task(0, info("queue", &[], "r", false));
        graph.add_task(1, info("queue", &["I1"], "I0", false));
        graph.add_task(2, info("queue", &["I0"], "I1", false));
        graph.add_dep(1, 2);
        graph.add_dep(2, 1);
        match graph.validate() {
            Err(GraphError::Cycle { involved }) => assert_eq!(involved, vec![1, 2]),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn missing_gamma_dependency() {
        let mut graph = TaskGraph::default();
        graph.add_task(0, info("queue", &["rdm1"], "Gamma0", true));
        graph.add_task(1, info("energy_queue", &["Gamma0"], "I3", false));
        assert!(matches!(
            graph.validate(),
            Err(GraphError::MissingGammaDependency { task: 1, producer: 0, .. })
        ));
        graph.add_dep(1, 0);
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn unknown_task() {
        let mut graph = TaskGraph::default();
        graph.add_task(0, info("queue", &[], "r", false));
        graph.add_dep(0, 7);
        assert!(matches!(graph.validate(), Err(GraphError::UnknownTask(7))));
    }
}
