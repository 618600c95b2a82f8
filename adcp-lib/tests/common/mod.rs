#![allow(dead_code)]

use adcp::ensemble::DataType;

/// Builds synthetic PD0 ensembles.
pub struct EnsembleBuilder {
    pub beams: u8,
    pub cells: u8,
    pub number: u16,
    pub data_types: Vec<DataType>,
    pub extra: Vec<Vec<u8>>,
}

impl Default for EnsembleBuilder {
    fn default() -> Self {
        EnsembleBuilder {
            beams: 4,
            cells: 10,
            number: 1,
            data_types: vec![
                DataType::VariableLeader,
                DataType::Velocity,
                DataType::Correlation,
                DataType::EchoIntensity,
                DataType::PercentGood,
            ],
            extra: Vec::new(),
        }
    }
}

impl EnsembleBuilder {
    pub fn number(mut self, number: u16) -> Self {
        self.number = number;
        self
    }

    pub fn beams(mut self, beams: u8) -> Self {
        self.beams = beams;
        self
    }

    pub fn cells(mut self, cells: u8) -> Self {
        self.cells = cells;
        self
    }

    pub fn data_types(mut self, data_types: &[DataType]) -> Self {
        self.data_types = data_types.to_vec();
        self
    }

    /// Append a raw section, ID included, after the configured data types.
    pub fn raw_section(mut self, section: Vec<u8>) -> Self {
        self.extra.push(section);
        self
    }

    fn fixed_leader(&self) -> Vec<u8> {
        let mut dat = vec![0u8; 59];
        dat[2] = 51;
        dat[3] = 40;
        // 1200 kHz, convex, transducer attached, down, 20 degree 4-beam janus
        dat[4..6].copy_from_slice(&[0b0100_1100, 0b0100_0001]);
        dat[8] = self.beams;
        dat[9] = self.cells;
        dat[10..12].copy_from_slice(&60u16.to_le_bytes());
        dat[12..14].copy_from_slice(&25u16.to_le_bytes());
        dat[25] = 0b0001_1111;
        dat[54..58].copy_from_slice(&8123u32.to_le_bytes());
        dat[58] = 20;
        dat
    }

    fn variable_leader(&self) -> Vec<u8> {
        let mut dat = vec![0u8; 65];
        dat[0..2].copy_from_slice(&0x0080u16.to_le_bytes());
        dat[2..4].copy_from_slice(&self.number.to_le_bytes());
        dat[4..11].copy_from_slice(&[9, 6, 15, 12, 30, 45, 0]);
        dat[14..16].copy_from_slice(&1500u16.to_le_bytes());
        dat[57..65].copy_from_slice(&[20, 9, 6, 15, 12, 30, 45, 0]);
        dat
    }

    fn section(&self, data_type: DataType) -> Vec<u8> {
        let n = usize::from(self.beams) * usize::from(self.cells);
        let mut dat = data_type.id().to_le_bytes().to_vec();
        match data_type {
            DataType::VariableLeader => return self.variable_leader(),
            DataType::Velocity => {
                for i in 0..n {
                    let v = i16::try_from(i).unwrap() - 20;
                    dat.extend_from_slice(&v.to_le_bytes());
                }
            }
            DataType::BottomTrack => dat.resize(81, 0),
            DataType::AuxiliarySensor => dat.extend_from_slice(&[1, 2, 3, 4]),
            DataType::FixedLeader => return self.fixed_leader(),
            _ => dat.extend((0..n).map(|i| (i % 256) as u8)),
        }
        dat
    }

    pub fn build(&self) -> Vec<u8> {
        let mut sections = vec![self.fixed_leader()];
        sections.extend(self.data_types.iter().map(|dt| self.section(*dt)));
        sections.extend(self.extra.iter().cloned());

        let num_types = sections.len();
        let mut dat = vec![0x7f, 0x7f, 0, 0, 0, u8::try_from(num_types).unwrap()];
        let mut offset = 6 + 2 * num_types;
        for section in &sections {
            dat.extend_from_slice(&u16::try_from(offset).unwrap().to_le_bytes());
            offset += section.len();
        }
        for section in &sections {
            dat.extend_from_slice(section);
        }
        dat.extend_from_slice(&[0, 0]);

        let len = u16::try_from(dat.len()).unwrap();
        dat[2..4].copy_from_slice(&len.to_le_bytes());
        let sum: u32 = dat.iter().map(|b| u32::from(*b)).sum();
        let checksum = u16::try_from(sum % 65535).unwrap();
        dat.extend_from_slice(&checksum.to_le_bytes());
        dat
    }
}

/// Concatenated ensembles numbered `first..first + count`.
pub fn ensemble_stream(first: u16, count: u16) -> Vec<u8> {
    (first..first + count)
        .flat_map(|n| EnsembleBuilder::default().number(n).build())
        .collect()
}
